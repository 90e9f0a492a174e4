//! Cancellation and deadline propagation for store lookups.
//!
//! A [`QueryContext`] travels with a lookup into the chunk store. Clones
//! share the same cancellation token, so cancelling any clone cancels the
//! lookup everywhere the context was passed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::StoreError;

/// Deadline and cancellation token for a single query.
///
/// # Examples
///
/// ```rust
/// use lazyseries::context::QueryContext;
/// use std::time::Duration;
///
/// let ctx = QueryContext::with_timeout(Duration::from_secs(5));
/// assert!(ctx.check().is_ok());
///
/// let clone = ctx.clone();
/// clone.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl QueryContext {
    /// A context with no deadline that is only cancelled explicitly.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context with an absolute deadline.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline, if any.
    ///
    /// Returns `Some(Duration::ZERO)` once the deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` if [`cancel`](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fails if the context is cancelled or past its deadline.
    ///
    /// Stores call this before and during expensive work.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] or [`StoreError::DeadlineExceeded`].
    pub fn check(&self) -> Result<(), StoreError> {
        if self.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(StoreError::DeadlineExceeded);
        }
        Ok(())
    }
}
