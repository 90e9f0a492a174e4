//! Core data types: timestamps, intervals, samples and metric identities.
//!
//! These mirror the Prometheus data model closely enough that a series
//! selected by a query planner can be handed to a lazy iterator unchanged:
//!
//! - [`Time`] - Milliseconds since the Unix epoch
//! - [`Interval`] - Closed `[from, through]` range over [`Time`]
//! - [`SamplePair`] - A single `(timestamp, value)` observation
//! - [`Metric`] - Sorted label set identifying one series

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label holding the metric name of a series.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A point on the logical timestamp axis, in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(i64);

impl Time {
    /// The earliest representable time.
    pub const EARLIEST: Time = Time(i64::MIN);

    /// The latest representable time.
    pub const LATEST: Time = Time(i64::MAX);

    /// Creates a time from milliseconds since the Unix epoch.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the time as milliseconds since the Unix epoch.
    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

impl From<i64> for Time {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A closed time range `[from, through]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    /// First time included in the range.
    pub from: Time,
    /// Last time included in the range.
    pub through: Time,
}

impl Interval {
    /// Creates a new interval.
    pub fn new(from: impl Into<Time>, through: impl Into<Time>) -> Self {
        Self {
            from: from.into(),
            through: through.into(),
        }
    }

    /// Returns `true` if `t` lies inside the interval, bounds included.
    pub fn contains(&self, t: Time) -> bool {
        self.from <= t && t <= self.through
    }

    /// Returns `true` if the interval contains no time at all.
    pub fn is_empty(&self) -> bool {
        self.from > self.through
    }
}

/// A single observed measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePair {
    /// When the sample was observed.
    pub timestamp: Time,
    /// The observed value.
    pub value: f64,
}

impl SamplePair {
    /// Sentinel returned by point lookups when no sample exists at or
    /// before the requested time.
    pub const ZERO: SamplePair = SamplePair {
        timestamp: Time::EARLIEST,
        value: 0.0,
    };

    /// Creates a new sample.
    pub fn new(timestamp: impl Into<Time>, value: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            value,
        }
    }

    /// Returns `true` if this is the [`SamplePair::ZERO`] sentinel.
    pub fn is_zero(&self) -> bool {
        self.timestamp == Time::EARLIEST && self.value == 0.0
    }
}

/// The label set identifying a single series.
///
/// Labels are kept sorted by name, so two metrics with the same labels are
/// equal and render identically regardless of construction order. A label
/// with an empty value is the same as no label at all and is dropped.
///
/// # Examples
///
/// ```rust
/// use lazyseries::model::Metric;
///
/// let metric = Metric::new([("__name__", "http_requests_total"), ("method", "GET")]);
/// assert_eq!(metric.name(), Some("http_requests_total"));
/// assert_eq!(metric.to_string(), r#"http_requests_total{method="GET"}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Metric {
    labels: BTreeMap<String, String>,
}

impl Metric {
    /// Creates a metric from label name/value pairs, dropping empty values.
    pub fn new<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .filter(|(_, v)| !v.is_empty())
                .collect(),
        }
    }

    /// Returns the value of the `__name__` label, if present.
    pub fn name(&self) -> Option<&str> {
        self.get(METRIC_NAME_LABEL)
    }

    /// Returns the value of the given label, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Returns an iterator over the labels in name order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of labels, the name label included.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if the metric has no labels at all.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl From<BTreeMap<String, String>> for Metric {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self::new(labels)
    }
}

impl From<Metric> for BTreeMap<String, String> {
    fn from(metric: Metric) -> Self {
        metric.labels
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            f.write_str(name)?;
        }
        f.write_str("{")?;
        let mut first = true;
        for (k, v) in self.labels().filter(|(k, _)| *k != METRIC_NAME_LABEL) {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v:?}")?;
            first = false;
        }
        f.write_str("}")
    }
}
