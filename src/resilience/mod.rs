//! Resilience subsystem (caller side).
//!
//! # Data Flow
//! ```text
//! Client operation:
//!     → timeouts.rs (race the call against cancellation and deadline)
//!     → on failure: retries.rs (retryable? back off, try again)
//!         → backoff.rs (exponential delay + jitter)
//! ```
//!
//! # Design Decisions
//! - Every call is bounded by the caller's context
//! - Retries only where the caller opted in
//! - The balancer already fails over; retries just give it a chance to finish

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{retry, RetryPolicy};
pub use timeouts::run_with_context;
