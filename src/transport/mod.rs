//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! Dialer
//!     → Transport::dial(address, timeout)      (tcp.rs)
//!     → MessageStream handle
//!     → handshake.rs (optional status query, version gate)
//!     → send/recv length-prefixed frames      (codec.rs, tokio-util Framed)
//! ```
//!
//! # Design Decisions
//! - The balancer only sees the two traits below, so tests can script
//!   member behaviour without sockets
//! - Every transport failure is a `TransportError`; nothing else is blamed
//!   on an endpoint

use async_trait::async_trait;
use std::time::Duration;

use crate::error::TransportError;
use crate::protocol::{Request, Response};

pub mod codec;
pub mod handshake;
pub mod tcp;

pub use tcp::TcpTransport;

/// Establishes stream-like handles to cluster members.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connect to `address` (a `host:port` dial target) within `timeout`.
    async fn dial(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn MessageStream>, TransportError>;
}

/// A connected, framed, bidirectional message stream.
///
/// `send` and `recv` must be cancel-safe: dropping either future partway
/// through a frame must leave the stream positioned for the next call.
#[async_trait]
pub trait MessageStream: Send + 'static {
    async fn send(&mut self, request: &Request) -> Result<(), TransportError>;

    async fn recv(&mut self) -> Result<Response, TransportError>;

    /// Best-effort close of the underlying stream.
    async fn shutdown(&mut self);
}
