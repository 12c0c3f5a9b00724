//! Endpoint bookkeeping subsystem.
//!
//! # Data Flow
//! ```text
//! Configured addresses
//!     → state.rs (parse, validate, per-endpoint health)
//!     → set.rs (ordered, unique collection)
//!     → balancer (candidate selection, health updates)
//!
//! Reconfiguration:
//!     new address list → set.rs replace → diff {added, removed}
//! ```
//!
//! # Design Decisions
//! - Pure data: no I/O, no locking; the balancer owns the only instance
//! - Health updates for endpoints that were just removed are ignored
//! - Insertion order is the fallback traversal order

pub mod set;
pub mod state;

pub use set::{EndpointDiff, EndpointSet};
pub use state::{AddressError, Endpoint, HealthState};
