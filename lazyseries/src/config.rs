//! Configuration for lazy series iterators.
//!
//! Configuration is plain JSON so it can live next to the rest of a query
//! service's settings:
//!
//! ```json
//! { "materialize_timeout": 2.5 }
//! ```
//!
//! Durations are written as seconds (float).

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::QueryContext;
use crate::error::ConfigError;

/// Settings shared by lazy iterators created from the same configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LazySeriesConfig {
    /// Deadline applied to the store lookup when the caller does not supply
    /// its own [`QueryContext`]. `None` means no deadline.
    #[serde(default, with = "duration_serde")]
    pub materialize_timeout: Option<Duration>,
}

impl LazySeriesConfig {
    /// Reads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid JSON for this schema, and
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `materialize_timeout` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.materialize_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid {
                reason: "materialize_timeout cannot be zero".to_string(),
            });
        }
        Ok(())
    }

    /// Builds the context used when a caller does not pass one.
    pub fn default_context(&self) -> QueryContext {
        match self.materialize_timeout {
            Some(timeout) => QueryContext::with_timeout(timeout),
            None => QueryContext::background(),
        }
    }
}

/// Serde support for optional Duration fields, as seconds (f64).
mod duration_serde {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(|seconds| Duration::try_from_secs_f64(seconds).map_err(D::Error::custom))
            .transpose()
    }
}
