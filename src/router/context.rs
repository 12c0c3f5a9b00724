//! Per-request deadline and cancellation.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Caller-side bounds carried by every request.
///
/// Cancellation and deadline expiry are the caller's doing and are never
/// reported against an endpoint.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// No deadline, not cancellable except through [`RequestContext::cancel`].
    pub fn new() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_at(Instant::now() + timeout)
    }

    /// Tie the context to an externally owned token.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            deadline: None,
            cancel: token,
        }
    }

    /// Set the deadline, keeping the earlier one if already set.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// A context that is cancelled with this one but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` without one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the context is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
