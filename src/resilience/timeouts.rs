//! Deadline and cancellation enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timer facilities
//! - Cancellation is checked before the deadline, and both before the work
//! - Caller-side outcomes are distinct errors, never transport errors

use std::future::Future;

use crate::error::{ClientError, ClientResult};
use crate::router::RequestContext;

/// Run `fut` until it completes, the context is cancelled (`Canceled`) or
/// its deadline passes (`DeadlineExceeded`). The future is dropped in the
/// latter two cases.
pub async fn run_with_context<T, F>(ctx: &RequestContext, fut: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    if ctx.is_cancelled() {
        return Err(ClientError::Canceled);
    }

    match ctx.deadline() {
        Some(deadline) => tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ClientError::Canceled),
            _ = tokio::time::sleep_until(deadline) => Err(ClientError::DeadlineExceeded),
            result = fut => result,
        },
        None => tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ClientError::Canceled),
            result = fut => result,
        },
    }
}
