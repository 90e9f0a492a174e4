//! Error types for lazy series iteration.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// The main error type for all lazyseries operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Materialization of a lazy series failed. The failure is cached on the
    /// handle and returned on every subsequent access.
    #[error("materialization failed: {0}")]
    Materialize(#[from] MaterializeError),

    /// The caller's own deadline expired while another caller was still
    /// materializing the handle.
    #[error("timed out after {waited:?} waiting for in-flight materialization")]
    WaitTimeout {
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The caller's own context was cancelled while another caller was
    /// still materializing the handle.
    #[error("cancelled after {waited:?} waiting for in-flight materialization")]
    WaitCancelled {
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// Error returned by a chunk store outside of materialization.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error building a label matcher.
    #[error("matcher error: {0}")]
    Matcher(#[from] MatcherError),

    /// Error loading or validating configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error building lazy handles for a selection.
    #[error("query error: {0}")]
    Query(#[from] QueryError),
}

/// Why a lazy series could not be materialized.
///
/// Cloneable so a single cached outcome can be handed to every caller.
#[derive(Error, Debug, Clone)]
pub enum MaterializeError {
    /// The series metric has no `__name__` label.
    #[error("series {metric} does not have a metric name")]
    MissingMetricName {
        /// The rendered metric that lacked a name.
        metric: String,
    },

    /// The chunk store lookup failed.
    #[error("chunk store lookup failed: {0}")]
    Store(#[source] Arc<StoreError>),

    /// The store returned a number of series other than one.
    #[error("expected exactly one series for metric {metric_name}, store returned {found}")]
    CardinalityMismatch {
        /// The metric name that was looked up.
        metric_name: String,
        /// How many series the store returned.
        found: usize,
    },

    /// The materializing caller unwound before producing an outcome.
    #[error("materialization aborted before completion")]
    Aborted,
}

impl From<StoreError> for MaterializeError {
    fn from(err: StoreError) -> Self {
        Self::Store(Arc::new(err))
    }
}

/// Errors reported by a chunk store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The query context was cancelled.
    #[error("query cancelled")]
    Cancelled,

    /// The query context deadline passed.
    #[error("query deadline exceeded")]
    DeadlineExceeded,

    /// The backend failed for a store-specific reason.
    #[error("backend failure: {reason}")]
    Backend {
        /// Description of the failure.
        reason: String,
    },
}

/// Errors that can occur when building label matchers.
#[derive(Error, Debug)]
pub enum MatcherError {
    /// The regular expression of a regex matcher did not compile.
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        /// The pattern as supplied.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A textual matcher could not be parsed.
    #[error("invalid matcher {input:?}: expected name=value, name!=value, name=~re or name!~re")]
    InvalidSyntax {
        /// The text that failed to parse.
        input: String,
    },
}

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: std::path::PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the config schema.
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: std::path::PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The configuration values are invalid.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Description of what's invalid.
        reason: String,
    },
}

/// Errors that can occur when selecting series lazily.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The selection has no equality matcher on `__name__`.
    #[error("selection {selection} has no equality matcher on the metric name")]
    MissingMetricNameMatcher {
        /// The rendered matchers of the selection.
        selection: String,
    },
}

/// Type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
