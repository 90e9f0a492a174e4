//! Chunk store interface and an in-memory implementation.
//!
//! [`ChunkStore`] is the boundary between lazy iterators and whatever fetches
//! and decodes stored chunks. Lazy iterators only ever call
//! [`ChunkStore::metric_name_iterators`]; the query layer additionally uses
//! [`ChunkStore::series`] as its index lookup.
//!
//! [`MemoryStore`] keeps every series in a `BTreeMap` and answers both
//! lookups by scanning it. It is meant for tests, demos and the CLI.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::context::QueryContext;
use crate::error::StoreError;
use crate::iterator::SampleSeriesIterator;
use crate::matcher::LabelMatcher;
use crate::model::{Interval, Metric, SamplePair, Time};

/// Source of materialized series data.
pub trait ChunkStore: Send + Sync {
    /// Fetches every series named `metric_name` that has samples in
    /// `[from, through]` and satisfies all `filters` and `matchers`.
    ///
    /// Returns one fully materialized iterator per matching series, holding
    /// only the samples inside the range.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the lookup fails or `ctx` is cancelled or
    /// past its deadline.
    fn metric_name_iterators(
        &self,
        ctx: &QueryContext,
        from: Time,
        through: Time,
        filters: &[LabelMatcher],
        matchers: &[LabelMatcher],
        metric_name: &str,
    ) -> Result<Vec<SampleSeriesIterator>, StoreError>;

    /// Index lookup: returns the identity of every series with samples in
    /// `[from, through]` that satisfies all `matchers`, without fetching
    /// sample data.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the lookup fails or `ctx` is cancelled or
    /// past its deadline.
    fn series(
        &self,
        ctx: &QueryContext,
        from: Time,
        through: Time,
        matchers: &[LabelMatcher],
    ) -> Result<Vec<Metric>, StoreError>;
}

/// In-memory [`ChunkStore`].
///
/// # Examples
///
/// ```rust
/// use lazyseries::context::QueryContext;
/// use lazyseries::model::{Metric, SamplePair, Time};
/// use lazyseries::store::{ChunkStore, MemoryStore};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut store = MemoryStore::new();
/// store.append(
///     Metric::new([("__name__", "up"), ("job", "api")]),
///     [SamplePair::new(1_000, 1.0)],
/// );
///
/// let found = store.metric_name_iterators(
///     &QueryContext::background(),
///     Time::EARLIEST,
///     Time::LATEST,
///     &[],
///     &[],
///     "up",
/// )?;
/// assert_eq!(found.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    series: BTreeMap<Metric, Vec<SamplePair>>,
    lookups: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends samples to a series, creating it if needed.
    pub fn append(&mut self, metric: Metric, samples: impl IntoIterator<Item = SamplePair>) {
        self.series.entry(metric).or_default().extend(samples);
    }

    /// Returns the number of distinct series held.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Returns how many times [`ChunkStore::metric_name_iterators`] was called.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn in_range(samples: &[SamplePair], interval: Interval) -> impl Iterator<Item = &SamplePair> {
        samples.iter().filter(move |s| interval.contains(s.timestamp))
    }
}

impl ChunkStore for MemoryStore {
    fn metric_name_iterators(
        &self,
        ctx: &QueryContext,
        from: Time,
        through: Time,
        filters: &[LabelMatcher],
        matchers: &[LabelMatcher],
        metric_name: &str,
    ) -> Result<Vec<SampleSeriesIterator>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        ctx.check()?;

        let interval = Interval { from, through };
        let mut found = Vec::new();
        for (metric, samples) in &self.series {
            if metric.name() != Some(metric_name) {
                continue;
            }
            if !matchers.iter().chain(filters).all(|m| m.matches_metric(metric)) {
                continue;
            }

            let samples: Vec<SamplePair> = Self::in_range(samples, interval).copied().collect();
            if samples.is_empty() {
                continue;
            }
            found.push(SampleSeriesIterator::new(metric.clone(), samples));
        }

        tracing::trace!(
            "memory store lookup for {metric_name} in [{from}, {through}] found {} series",
            found.len()
        );
        Ok(found)
    }

    fn series(
        &self,
        ctx: &QueryContext,
        from: Time,
        through: Time,
        matchers: &[LabelMatcher],
    ) -> Result<Vec<Metric>, StoreError> {
        ctx.check()?;

        let interval = Interval { from, through };
        Ok(self
            .series
            .iter()
            .filter(|(metric, _)| matchers.iter().all(|m| m.matches_metric(metric)))
            .filter(|(_, samples)| Self::in_range(samples, interval).next().is_some())
            .map(|(metric, _)| metric.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::SeriesIterator;
    use crate::matcher::MatchType;

    fn populated_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.append(
            Metric::new([("__name__", "http_requests_total"), ("job", "api"), ("env", "prod")]),
            [SamplePair::new(10, 1.0), SamplePair::new(20, 2.0)],
        );
        store.append(
            Metric::new([("__name__", "http_requests_total"), ("job", "web")]),
            [SamplePair::new(15, 5.0)],
        );
        store.append(
            Metric::new([("__name__", "up"), ("job", "api")]),
            [SamplePair::new(10, 1.0)],
        );
        store
    }

    #[test]
    fn test_append_extends_existing_series() {
        let mut store = MemoryStore::new();
        let metric = Metric::new([("__name__", "up")]);
        store.append(metric.clone(), [SamplePair::new(20, 2.0)]);
        store.append(metric, [SamplePair::new(10, 1.0)]);
        assert_eq!(store.series_count(), 1);

        let found = store
            .metric_name_iterators(
                &QueryContext::background(),
                Time::EARLIEST,
                Time::LATEST,
                &[],
                &[],
                "up",
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].samples(), &[SamplePair::new(10, 1.0), SamplePair::new(20, 2.0)]);
    }

    #[test]
    fn test_metric_name_iterators_applies_matchers_and_filters() {
        let store = populated_store();
        let ctx = QueryContext::background();

        let all = store
            .metric_name_iterators(
                &ctx,
                Time::EARLIEST,
                Time::LATEST,
                &[],
                &[],
                "http_requests_total",
            )
            .unwrap();
        assert_eq!(all.len(), 2);

        let api = store
            .metric_name_iterators(
                &ctx,
                Time::EARLIEST,
                Time::LATEST,
                &[],
                &[LabelMatcher::equal("job", "api")],
                "http_requests_total",
            )
            .unwrap();
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].metric().get("job"), Some("api"));

        // env="" only matches series without an env label
        let no_env = store
            .metric_name_iterators(
                &ctx,
                Time::EARLIEST,
                Time::LATEST,
                &[LabelMatcher::equal("env", "")],
                &[],
                "http_requests_total",
            )
            .unwrap();
        assert_eq!(no_env.len(), 1);
        assert_eq!(no_env[0].metric().get("job"), Some("web"));
        assert_eq!(store.lookup_count(), 3);
    }

    #[test]
    fn test_metric_name_iterators_restricts_time_range() {
        let store = populated_store();
        let found = store
            .metric_name_iterators(
                &QueryContext::background(),
                Time::from_millis(12),
                Time::from_millis(20),
                &[],
                &[],
                "http_requests_total",
            )
            .unwrap();

        // Both series have samples in range; the api series loses its t=10 sample.
        assert_eq!(found.len(), 2);
        let api = found.iter().find(|it| it.metric().get("job") == Some("api")).unwrap();
        assert_eq!(api.samples(), &[SamplePair::new(20, 2.0)]);

        let none = store
            .metric_name_iterators(
                &QueryContext::background(),
                Time::from_millis(21),
                Time::from_millis(30),
                &[],
                &[],
                "http_requests_total",
            )
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_lookups_honour_context() {
        let store = populated_store();
        let ctx = QueryContext::background();
        ctx.cancel();

        let result =
            store.metric_name_iterators(&ctx, Time::EARLIEST, Time::LATEST, &[], &[], "up");
        assert_eq!(result, Err(StoreError::Cancelled));

        let result = store.series(&ctx, Time::EARLIEST, Time::LATEST, &[]);
        assert_eq!(result, Err(StoreError::Cancelled));
    }

    #[test]
    fn test_series_index_lookup() {
        let store = populated_store();
        let matchers = vec![
            LabelMatcher::new(MatchType::RegexMatch, "__name__", "http_.*").unwrap(),
            LabelMatcher::new(MatchType::NotEqual, "job", "web").unwrap(),
        ];
        let found = store
            .series(&QueryContext::background(), Time::EARLIEST, Time::LATEST, &matchers)
            .unwrap();
        assert_eq!(
            found,
            vec![Metric::new([
                ("__name__", "http_requests_total"),
                ("job", "api"),
                ("env", "prod"),
            ])]
        );
        assert_eq!(store.lookup_count(), 0);
    }
}
