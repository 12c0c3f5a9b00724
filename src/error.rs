//! Error taxonomy for the client.
//!
//! # Classes
//! - `InvalidConfiguration`: bad endpoint list or settings; no partial effect
//! - `Dial`: could not establish a usable connection (transient or version gate)
//! - `Transport`: an established connection failed mid-request
//! - `Canceled` / `DeadlineExceeded`: caller-side, never blamed on an endpoint
//! - `ClientClosed`: terminal, never retried

use thiserror::Error;

use crate::protocol::version::ClusterVersion;

/// Failures of the framed transport. Every variant is transport-classified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// TCP connect failed (refused, unreachable, resolution error).
    #[error("connect failed: {0}")]
    Connect(String),

    /// The transport itself timed out.
    #[error("transport timed out after {0} ms")]
    Timeout(u64),

    /// Peer closed the stream, or the connection was released locally.
    #[error("connection closed")]
    Closed,

    /// Read or write failure on an open stream.
    #[error("I/O error: {0}")]
    Io(String),

    /// Frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Peer announced a frame larger than we accept.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Codec(e.to_string())
    }
}

/// Failure to turn an endpoint into a usable connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DialError {
    /// Network-level failure; the next candidate is tried.
    #[error("failed to dial {endpoint}: {reason}")]
    Transient { endpoint: String, reason: String },

    /// The member reported a protocol version older than we support.
    #[error("{endpoint} reports cluster version {reported}, minimum supported is {minimum}")]
    IncompatibleCluster {
        endpoint: String,
        reported: ClusterVersion,
        minimum: ClusterVersion,
    },
}

impl DialError {
    /// Endpoint this error is attributed to.
    pub fn endpoint(&self) -> &str {
        match self {
            DialError::Transient { endpoint, .. } => endpoint,
            DialError::IncompatibleCluster { endpoint, .. } => endpoint,
        }
    }

    pub fn is_incompatible_cluster(&self) -> bool {
        matches!(self, DialError::IncompatibleCluster { .. })
    }
}

/// Errors returned by every public client operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Empty, duplicate or malformed endpoint list, or invalid settings.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No usable connection could be established.
    #[error(transparent)]
    Dial(#[from] DialError),

    /// The client was closed.
    #[error("client is closed")]
    ClientClosed,

    /// The caller canceled the request.
    #[error("request canceled")]
    Canceled,

    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The connection failed while the request was in flight.
    #[error("transport failure on {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    /// The member answered with an application-level error.
    #[error("remote error: {0}")]
    Remote(String),
}

impl ClientError {
    /// True for errors that count as evidence of a bad endpoint.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }

    /// True for errors caused by the caller rather than the cluster.
    pub fn is_caller_side(&self) -> bool {
        matches!(self, ClientError::Canceled | ClientError::DeadlineExceeded)
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
