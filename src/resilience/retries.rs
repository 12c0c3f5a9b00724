//! Caller-side retry logic.
//!
//! # Responsibilities
//! - Decide which errors are worth another attempt
//! - Execute retries with exponential backoff + jitter
//! - Stop early on cancellation or deadline
//!
//! # Design Decisions
//! - The router never retries; callers opt in per operation because only
//!   they know whether it is idempotent
//! - Transport failures and transient dial exhaustion are retryable; the
//!   balancer has already failed over by the time the error surfaces
//! - Closed clients, bad configuration, old clusters, caller-side aborts and
//!   remote application errors are final

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{ClientError, ClientResult, DialError};
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::timeouts::run_with_context;
use crate::router::RequestContext;

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        if !config.enabled {
            return Self::none();
        }
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        )
    }

    pub fn is_retryable(error: &ClientError) -> bool {
        matches!(
            error,
            ClientError::Transport { .. } | ClientError::Dial(DialError::Transient { .. })
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `op` up to `policy.max_attempts()` times. `op` receives the 1-based
/// attempt number. Backoff sleeps honour the context.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, ctx: &RequestContext, mut op: F) -> ClientResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let mut attempt = 1;
    loop {
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if attempt >= policy.max_attempts || !RetryPolicy::is_retryable(&error) {
            return Err(error);
        }

        let delay = policy.delay_after(attempt);
        tracing::debug!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying request"
        );
        run_with_context(ctx, async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await?;
        attempt += 1;
    }
}
