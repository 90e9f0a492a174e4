//! Lazily materialized series iterator.
//!
//! A [`LazySeriesIterator`] carries the identity of one series (metric, time
//! range, matchers) and a handle to the chunk store, but fetches nothing
//! until a caller first asks for sample values. Query planners can return
//! thousands of these cheaply; only the ones whose samples are actually read
//! pay for a store lookup.
//!
//! # Materialization
//!
//! The first value access on a handle, from whichever thread gets there
//! first, performs the store lookup. Every other caller, concurrent or
//! later, blocks until that lookup finishes and then observes its outcome.
//! The outcome, success or failure, is cached for the lifetime of the handle:
//!
//! ```text
//! Pending ──first access──▶ Materializing ──▶ Materialized(iterator)
//!                                        └──▶ Failed(error)
//! ```
//!
//! The store lookup runs under the [`QueryContext`] of the caller that
//! triggered it. Callers that arrive while a lookup is in flight only use
//! their own context to bound how long they wait: they stop waiting when it
//! is cancelled or its deadline passes. Giving up does not affect the
//! lookup, and later callers still observe its outcome.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::LazySeriesConfig;
use crate::context::QueryContext;
use crate::error::{Error, MaterializeError, Result};
use crate::iterator::{SampleSeriesIterator, SeriesIterator};
use crate::matcher::{LabelMatcher, split_filters_and_matchers};
use crate::model::{Interval, Metric, SamplePair, Time};
use crate::store::ChunkStore;

/// Upper bound on how long a waiter blocks before rechecking its context.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Observable materialization state of a [`LazySeriesIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializationState {
    /// No value access has happened yet.
    Pending,
    /// A caller is currently fetching from the store.
    Materializing,
    /// The series was fetched and is cached.
    Materialized,
    /// Fetching failed; the error is cached.
    Failed,
}

enum State {
    Pending,
    Materializing,
    Materialized(Arc<SampleSeriesIterator>),
    Failed(MaterializeError),
}

/// A series iterator that fetches its samples on first use, exactly once.
///
/// `LazySeriesIterator` is `Send + Sync`; share it behind an `Arc` and call
/// value operations from as many threads as needed.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use lazyseries::lazy::LazySeriesIterator;
/// use lazyseries::iterator::SeriesIterator;
/// use lazyseries::matcher::LabelMatcher;
/// use lazyseries::model::{Metric, SamplePair, Time};
/// use lazyseries::store::MemoryStore;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let metric = Metric::new([("__name__", "up"), ("job", "api")]);
///
/// let mut store = MemoryStore::new();
/// store.append(metric.clone(), [SamplePair::new(10, 1.0), SamplePair::new(20, 0.0)]);
/// let store = Arc::new(store);
///
/// let lazy = LazySeriesIterator::new(
///     store.clone(),
///     metric,
///     Time::from_millis(0),
///     Time::from_millis(100),
///     vec![LabelMatcher::equal("job", "api")],
/// );
/// assert_eq!(store.lookup_count(), 0);
///
/// let sample = lazy.value_at_or_before_time(Time::from_millis(15))?;
/// assert_eq!(sample, SamplePair::new(10, 1.0));
/// assert_eq!(store.lookup_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct LazySeriesIterator {
    metric: Metric,
    from: Time,
    through: Time,
    matchers: Vec<LabelMatcher>,
    store: Arc<dyn ChunkStore>,
    config: LazySeriesConfig,

    state: Mutex<State>,
    completed: Condvar,
}

impl LazySeriesIterator {
    /// Creates a handle for one series. Nothing is fetched.
    ///
    /// `matchers` must select exactly the series identified by `metric`
    /// under its metric name; materialization fails otherwise.
    pub fn new(
        store: Arc<dyn ChunkStore>,
        metric: Metric,
        from: Time,
        through: Time,
        matchers: Vec<LabelMatcher>,
    ) -> Self {
        Self {
            metric,
            from,
            through,
            matchers,
            store,
            config: LazySeriesConfig::default(),
            state: Mutex::new(State::Pending),
            completed: Condvar::new(),
        }
    }

    /// Replaces the configuration used when callers do not pass a context.
    pub fn with_config(mut self, config: LazySeriesConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the start of the query range.
    pub fn from(&self) -> Time {
        self.from
    }

    /// Returns the end of the query range.
    pub fn through(&self) -> Time {
        self.through
    }

    /// Returns the matchers the store lookup is made with.
    pub fn matchers(&self) -> &[LabelMatcher] {
        &self.matchers
    }

    /// Returns the handle's configuration.
    pub fn config(&self) -> &LazySeriesConfig {
        &self.config
    }

    /// Returns the current materialization state without triggering it.
    pub fn state(&self) -> MaterializationState {
        match &*self.lock_state() {
            State::Pending => MaterializationState::Pending,
            State::Materializing => MaterializationState::Materializing,
            State::Materialized(_) => MaterializationState::Materialized,
            State::Failed(_) => MaterializationState::Failed,
        }
    }

    /// Returns the cached materialization error, if materialization failed.
    pub fn materialization_error(&self) -> Option<MaterializeError> {
        match &*self.lock_state() {
            State::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Like [`SeriesIterator::value_at_or_before_time`], with the caller's context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Materialize`] with the cached failure, or
    /// [`Error::WaitTimeout`] / [`Error::WaitCancelled`] if `ctx` expires or
    /// is cancelled while another caller is still materializing.
    pub fn value_at_or_before_time_with_context(
        &self,
        ctx: &QueryContext,
        t: Time,
    ) -> Result<SamplePair> {
        self.materialize(ctx)?.value_at_or_before_time(t)
    }

    /// Like [`SeriesIterator::range_values`], with the caller's context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Materialize`] with the cached failure, or
    /// [`Error::WaitTimeout`] / [`Error::WaitCancelled`] if `ctx` expires or
    /// is cancelled while another caller is still materializing.
    pub fn range_values_with_context(
        &self,
        ctx: &QueryContext,
        interval: Interval,
    ) -> Result<Vec<SamplePair>> {
        self.materialize(ctx)?.range_values(interval)
    }

    /// Materializes the series if needed and returns the shared iterator.
    ///
    /// If this call wins the race to materialize, the store lookup runs on
    /// the calling thread under `ctx`. Otherwise the call blocks until the
    /// outcome is available, or until `ctx` is cancelled or its deadline
    /// passes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Materialize`] with the cached failure, or
    /// [`Error::WaitTimeout`] / [`Error::WaitCancelled`] if `ctx` expires or
    /// is cancelled while another caller is still materializing.
    pub fn materialize(&self, ctx: &QueryContext) -> Result<Arc<SampleSeriesIterator>> {
        let wait_started = Instant::now();
        let mut state = self.lock_state();

        loop {
            match &*state {
                State::Materialized(it) => return Ok(Arc::clone(it)),
                State::Failed(err) => return Err(err.clone().into()),
                State::Pending => {
                    *state = State::Materializing;
                    drop(state);
                    return self.run_materialization(ctx);
                }
                State::Materializing => {
                    if ctx.is_cancelled() {
                        return Err(Error::WaitCancelled {
                            waited: wait_started.elapsed(),
                        });
                    }

                    // Wake up periodically so cancellation is noticed while blocked.
                    let mut slice = CANCEL_POLL_INTERVAL;
                    if let Some(deadline) = ctx.deadline() {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            return Err(Error::WaitTimeout {
                                waited: wait_started.elapsed(),
                            });
                        }
                        slice = slice.min(remaining);
                    }

                    tracing::trace!("waiting for in-flight materialization of {}", self.metric);
                    state = self
                        .completed
                        .wait_timeout(state, slice)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    /// Runs the store lookup and publishes its outcome. Only ever entered by
    /// the caller that moved the state from `Pending` to `Materializing`.
    fn run_materialization(&self, ctx: &QueryContext) -> Result<Arc<SampleSeriesIterator>> {
        tracing::debug!(
            "materializing series {} over [{}, {}]",
            self.metric,
            self.from,
            self.through
        );

        let mut guard = CompletionGuard {
            iter: self,
            published: false,
        };

        match self.fetch(ctx) {
            Ok(it) => {
                tracing::debug!("materialized series {} with {} samples", self.metric, it.len());
                let it = Arc::new(it);
                guard.publish(State::Materialized(Arc::clone(&it)));
                Ok(it)
            }
            Err(err) => {
                tracing::warn!("failed to materialize series {}: {err}", self.metric);
                guard.publish(State::Failed(err.clone()));
                Err(err.into())
            }
        }
    }

    fn fetch(
        &self,
        ctx: &QueryContext,
    ) -> std::result::Result<SampleSeriesIterator, MaterializeError> {
        let metric_name = self
            .metric
            .name()
            .ok_or_else(|| MaterializeError::MissingMetricName {
                metric: self.metric.to_string(),
            })?;

        let (filters, matchers) = split_filters_and_matchers(&self.matchers);
        let found = self.store.metric_name_iterators(
            ctx,
            self.from,
            self.through,
            &filters,
            &matchers,
            metric_name,
        )?;

        // A lazy handle stands for exactly one series.
        let [it]: [SampleSeriesIterator; 1] =
            found
                .try_into()
                .map_err(|found: Vec<_>| MaterializeError::CardinalityMismatch {
                    metric_name: metric_name.to_string(),
                    found: found.len(),
                })?;
        Ok(it)
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // State is only ever replaced whole, so a poisoned lock still holds a valid value.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publishes the materialization outcome and wakes waiters. If the
/// materializing caller unwinds before publishing, the handle is marked
/// failed so waiters never block forever.
struct CompletionGuard<'a> {
    iter: &'a LazySeriesIterator,
    published: bool,
}

impl CompletionGuard<'_> {
    fn publish(&mut self, outcome: State) {
        *self.iter.lock_state() = outcome;
        self.published = true;
        self.iter.completed.notify_all();
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            tracing::warn!("materialization of {} aborted", self.iter.metric);
            self.publish(State::Failed(MaterializeError::Aborted));
        }
    }
}

impl SeriesIterator for LazySeriesIterator {
    fn metric(&self) -> &Metric {
        &self.metric
    }

    fn value_at_or_before_time(&self, t: Time) -> Result<SamplePair> {
        self.value_at_or_before_time_with_context(&self.config.default_context(), t)
    }

    fn range_values(&self, interval: Interval) -> Result<Vec<SamplePair>> {
        self.range_values_with_context(&self.config.default_context(), interval)
    }

    fn close(&self) {}
}

impl fmt::Debug for LazySeriesIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySeriesIterator")
            .field("metric", &self.metric)
            .field("from", &self.from)
            .field("through", &self.through)
            .field("matchers", &self.matchers)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
