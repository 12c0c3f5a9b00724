//! Client-side connection manager for a replicated key-value cluster.
//!
//! Keeps one connection to one member at a time, fails over between
//! members, gates old cluster versions and lets callers swap the endpoint
//! list at runtime.

pub mod balancer;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod resilience;
pub mod router;
pub mod transport;

pub use balancer::{Balancer, BalancerEvent, BalancerState};
pub use client::{Client, EndpointStatus};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, DialError, TransportError};
pub use router::RequestContext;
