//! Per-call context
//!
//! A [`Context`] carries what an operation needs besides its arguments:
//! - cancellation (a [`CancellationToken`])
//! - an optional absolute deadline
//! - an optional [`Trace`] receiving network events
//!
//! Contexts are cheap to clone. Clones share the token, so canceling one
//! cancels all of them; [`Context::child`] derives a token that is canceled
//! with its parent but can also be canceled on its own.

use crate::trace::{NoopTrace, Trace};
use crate::{Error, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

static NOOP_TRACE: NoopTrace = NoopTrace;

/// Cancellation, deadline and trace for one logical operation
#[derive(Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    trace: Option<Arc<dyn Trace>>,
}

impl Context {
    /// Create a context with no deadline and no trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a context whose token is canceled together with this one.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            trace: self.trace.clone(),
        }
    }

    /// Set the deadline to `timeout` from now, unless the current deadline
    /// is earlier.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Set the deadline, unless the current one is earlier.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Attach the trace that receives network events.
    pub fn with_trace(mut self, trace: Arc<dyn Trace>) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Use an existing cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The attached trace, or a no-op trace.
    pub fn trace(&self) -> &dyn Trace {
        match &self.trace {
            Some(trace) => trace.as_ref(),
            None => &NOOP_TRACE,
        }
    }

    pub fn has_trace(&self) -> bool {
        self.trace.is_some()
    }

    /// Why the context is done, if it is.
    pub fn err(&self) -> Option<Error> {
        if self.cancel.is_cancelled() {
            return Some(Error::Canceled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Drive `fut` until it completes, the context is canceled, or the
    /// deadline passes. In the last two cases `fut` is dropped, which
    /// releases every resource it owns.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Canceled),
            _ = deadline => Err(Error::DeadlineExceeded),
            result = fut => result,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("canceled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .field("trace", &self.trace.is_some())
            .finish()
    }
}
