//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! Client operation (get/put/delete/status)
//!     → router.rs (with_connection)
//!         → Balancer::acquire, bounded by RequestContext (context.rs)
//!         → exchange on the connection, bounded by RequestContext
//!         → transport error? Balancer::report_failure
//!     → Return: response body, or classified ClientError
//! ```
//!
//! # Design Decisions
//! - Every request carries a context; there is no implicit global timeout
//! - The router is stateless apart from its balancer handle

pub mod context;
#[allow(clippy::module_inception)]
pub mod router;

pub use context::RequestContext;
pub use router::Router;
