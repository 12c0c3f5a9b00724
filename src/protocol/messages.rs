//! Request and response envelopes exchanged with cluster members.
//!
//! The store's own value encoding lives elsewhere; keys and values are
//! carried here as plain strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::version::ClusterVersion;

/// Correlates a response with the request that produced it.
pub type RequestId = Uuid;

/// A request envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub body: RequestBody,
}

impl Request {
    pub fn new(body: RequestBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            body,
        }
    }

    /// Cluster metadata query used by the handshake.
    pub fn status() -> Self {
        Self::new(RequestBody::Status)
    }
}

/// Operations understood by a member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RequestBody {
    /// Member and cluster metadata.
    Status,
    /// Read a single key. Serializable reads may be served by any member
    /// without leader confirmation.
    Range { key: String, serializable: bool },
    Put { key: String, value: String },
    DeleteRange { key: String },
}

impl RequestBody {
    /// Short operation name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            RequestBody::Status => "status",
            RequestBody::Range { .. } => "range",
            RequestBody::Put { .. } => "put",
            RequestBody::DeleteRange { .. } => "delete_range",
        }
    }
}

/// A response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(id: RequestId, body: ResponseBody) -> Self {
        Self { id, body }
    }

    pub fn error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(id, ResponseBody::Error { message: message.into() })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    Status(MemberStatus),
    Range { kv: Option<KeyValue> },
    Put { revision: u64 },
    DeleteRange { deleted: u64 },
    /// Application-level failure reported by the member.
    Error { message: String },
}

/// Metadata returned by the status query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberStatus {
    pub member_id: u64,
    pub cluster_version: ClusterVersion,
    /// Current leader as seen by this member, if any.
    pub leader: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    pub mod_revision: u64,
}
