//! # lazyseries
//!
//! Lazy, exactly-once materialized series iterators over a chunk store.
//!
//! A query planner resolves a selection like `up{job="api"}` into a set of
//! series long before anybody reads their samples, and many evaluations
//! never read them at all. lazyseries lets the planner hand out cheap
//! [`LazySeriesIterator`] handles instead: each one remembers which series
//! and time range it stands for, and fetches its samples from the
//! [`ChunkStore`] only on the first value access.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Constructing and passing around a handle never touches the store
//! - The store is called at most once per handle, however many threads read it
//! - Every reader observes the same outcome, success or failure
//! - Failures are returned to callers, never silently turned into "no data"
//! - Store lookups run under the caller's deadline and cancellation token
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use lazyseries::{
//!     ChunkStore, Interval, LabelMatcher, LazySeriesConfig, MemoryStore, Metric, QueryContext,
//!     SamplePair, SeriesIterator, Time, lazy_series_iterators,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = MemoryStore::new();
//! store.append(
//!     Metric::new([("__name__", "cpu_usage"), ("host", "web1")]),
//!     [SamplePair::new(10, 1.0), SamplePair::new(20, 2.0), SamplePair::new(30, 3.0)],
//! );
//! let store: Arc<dyn ChunkStore> = Arc::new(store);
//!
//! // Resolve the selection; nothing is fetched yet.
//! let handles = lazy_series_iterators(
//!     &store,
//!     &QueryContext::background(),
//!     Time::from_millis(0),
//!     Time::from_millis(100),
//!     &[LabelMatcher::equal("__name__", "cpu_usage")],
//!     &LazySeriesConfig::default(),
//! )?;
//!
//! // The first read materializes the series.
//! let cpu = &handles[0];
//! assert_eq!(cpu.value_at_or_before_time(Time::from_millis(25))?, SamplePair::new(20, 2.0));
//! assert_eq!(cpu.range_values(Interval::new(15, 30))?.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`LazySeriesIterator`]: Deferred handle; materializes once, then delegates
//! - [`SeriesIterator`]: Point and range access shared by lazy and materialized iterators
//! - [`ChunkStore`]: The store interface lazy iterators fetch through
//! - [`QueryContext`]: Deadline and cancellation passed to the store
//!
//! ## Modules
//!
//! - [`lazy`]: Lazy iterator and its materialization state machine
//! - [`iterator`]: Series iterator trait and the in-memory materialized iterator
//! - [`store`]: Chunk store trait and [`MemoryStore`]
//! - [`query`]: Building lazy handles for every series of a selection
//! - [`matcher`]: Label matchers and the filter/matcher split
//! - [`model`]: Time, intervals, samples and metrics
//! - [`context`]: Query deadlines and cancellation
//! - [`config`]: JSON configuration
//! - [`error`]: Error types

pub mod config;
pub mod context;
pub mod error;
pub mod iterator;
pub mod lazy;
pub mod matcher;
pub mod model;
pub mod query;
pub mod store;

// Re-export primary API types at crate root for convenience.
pub use config::LazySeriesConfig;
pub use context::QueryContext;
pub use error::{Error, MaterializeError, Result, StoreError};
pub use iterator::{SampleSeriesIterator, SeriesIterator};
pub use lazy::{LazySeriesIterator, MaterializationState};
pub use matcher::{LabelMatcher, MatchType, split_filters_and_matchers};
pub use model::{Interval, METRIC_NAME_LABEL, Metric, SamplePair, Time};
pub use query::lazy_series_iterators;
pub use store::{ChunkStore, MemoryStore};
