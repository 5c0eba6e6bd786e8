//! Request context carrying cancellation, deadline and tracing span
//!
//! A [`RequestContext`] is cheap to clone; clones share the same cancellation
//! state, so a caller can keep one handle and cancel a request whose result
//! set has already been handed to a consumer.
//!
//! Every blocking call into a storage capability goes through
//! [`RequestContext::guard`], which races the call against cancellation and
//! the deadline.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::Span;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Per-request context supplied by the protocol layer
#[derive(Debug, Clone)]
pub struct RequestContext {
    state: Arc<CancelState>,
    deadline: Option<Instant>,
    span: Span,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Create a context with no deadline, parented on the current span
    pub fn new() -> Self {
        Self {
            state: Arc::new(CancelState::default()),
            deadline: None,
            span: Span::current(),
        }
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach the span request spans should be parented on
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Deadline, if one was set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Parent span for request spans
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Cancel the request and wake every pending [`guard`](Self::guard)
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Whether [`cancel`](Self::cancel) was called on this context or a clone
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Whether the deadline has elapsed
    pub fn is_timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast if the request should stop
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_timed_out() {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// Resolves once the context is cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking the flag so a concurrent cancel is not missed
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Run a blocking capability call, abandoning it on cancellation or deadline
    ///
    /// The call's future is dropped when the request stops, which releases
    /// anything it had acquired.
    pub async fn guard<T, E, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<Error>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled),
            _ = sleep_until(self.deadline) => Err(Error::DeadlineExceeded),
            res = fut => res.map_err(Into::into),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
