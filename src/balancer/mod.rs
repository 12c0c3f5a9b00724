//! Balancer subsystem: dialing, candidate selection, the single active
//! connection and reconfiguration.
//!
//! # Data Flow
//! ```text
//! Router::with_connection
//!     → Balancer::acquire (pool.rs)
//!         Ready        → shared Arc<Connection>
//!         NoConnection → start dial cycle, wait
//!         Dialing      → wait for the cycle to resolve
//!     → dial cycle (background task, lock released while dialing):
//!         round_robin.rs (next candidate after last used, skip cooling)
//!         → dialer.rs (transport dial + optional version handshake)
//!         → publish Ready / try next / exhaust → NoConnection
//!
//! Router reports transport error → Balancer::report_failure
//!     → close connection, mark endpoint unhealthy, start cycle
//!
//! Balancer::set_endpoints (reconfiguration)
//!     → EndpointSet::replace → release connection if its endpoint was removed
//! ```
//!
//! # Design Decisions
//! - One lock guards the endpoint set and the active connection; no I/O
//!   happens while it is held
//! - Dial cycles run in spawned tasks so a caller giving up cannot strand
//!   the balancer in `Dialing`
//! - Requests arriving during a dial cycle wait for it instead of failing
//!   fast; the caller's deadline bounds the wait
//! - Each cycle has an id; results from superseded cycles are discarded

use std::time::Duration;

use crate::error::DialError;

pub mod connection;
pub mod dialer;
pub mod pool;
pub mod round_robin;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use dialer::Dialer;
pub use pool::{Balancer, BalancerState};

/// Default dial timeout when none is configured.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default window during which a failed endpoint is skipped.
pub const DEFAULT_UNHEALTHY_COOLDOWN: Duration = Duration::from_secs(5);

/// Balancer tuning derived from the client configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalancerConfig {
    pub dial_timeout: Duration,
    pub reject_old_cluster: bool,
    pub unhealthy_cooldown: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            reject_old_cluster: false,
            unhealthy_cooldown: DEFAULT_UNHEALTHY_COOLDOWN,
        }
    }
}

/// Connection-health notifications. Best effort: slow subscribers may lag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalancerEvent {
    /// A dial cycle produced a ready connection.
    Connected { endpoint: String },
    /// The active connection failed; a new cycle started.
    Failover { from: String, reason: String },
    /// The endpoint set changed.
    EndpointsReplaced { added: Vec<String>, removed: Vec<String> },
    /// A dial cycle tried every candidate without success.
    Exhausted { error: DialError },
    Closed,
}
