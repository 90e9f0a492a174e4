//! The series iterator capability and its materialized implementation.
//!
//! [`SeriesIterator`] is the surface the query layer works against. Both the
//! already-fetched [`SampleSeriesIterator`] and the deferred
//! [`LazySeriesIterator`](crate::lazy::LazySeriesIterator) implement it, so
//! callers can mix them freely behind `&dyn SeriesIterator`.

use crate::error::Result;
use crate::model::{Interval, Metric, SamplePair, Time};

/// Point and range access over the samples of a single series.
pub trait SeriesIterator {
    /// Returns the identity of the series. Never fails and never fetches.
    fn metric(&self) -> &Metric;

    /// Returns the latest sample at or before `t`, or
    /// [`SamplePair::ZERO`] if there is none.
    ///
    /// # Errors
    ///
    /// Implementations that fetch lazily return the fetch failure.
    fn value_at_or_before_time(&self, t: Time) -> Result<SamplePair>;

    /// Returns every sample inside `interval`, in ascending time order.
    ///
    /// # Errors
    ///
    /// Implementations that fetch lazily return the fetch failure.
    fn range_values(&self, interval: Interval) -> Result<Vec<SamplePair>>;

    /// Releases resources held by the iterator. Safe to call repeatedly.
    fn close(&self) {}
}

/// A series whose samples are already in memory.
///
/// Samples are sorted by timestamp on construction; lookups are binary
/// searches over the sorted slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSeriesIterator {
    metric: Metric,
    samples: Vec<SamplePair>,
}

impl SampleSeriesIterator {
    /// Creates a materialized iterator, sorting `samples` by timestamp.
    pub fn new(metric: Metric, mut samples: Vec<SamplePair>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self { metric, samples }
    }

    /// Returns all samples in ascending time order.
    pub fn samples(&self) -> &[SamplePair] {
        &self.samples
    }

    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the series holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn at_or_before(&self, t: Time) -> SamplePair {
        let idx = self.samples.partition_point(|s| s.timestamp <= t);
        match idx {
            0 => SamplePair::ZERO,
            n => self.samples[n - 1],
        }
    }

    fn within(&self, interval: Interval) -> &[SamplePair] {
        if interval.is_empty() {
            return &[];
        }
        let start = self.samples.partition_point(|s| s.timestamp < interval.from);
        let end = self.samples.partition_point(|s| s.timestamp <= interval.through);
        &self.samples[start..end]
    }
}

impl SeriesIterator for SampleSeriesIterator {
    fn metric(&self) -> &Metric {
        &self.metric
    }

    fn value_at_or_before_time(&self, t: Time) -> Result<SamplePair> {
        Ok(self.at_or_before(t))
    }

    fn range_values(&self, interval: Interval) -> Result<Vec<SamplePair>> {
        Ok(self.within(interval).to_vec())
    }
}
