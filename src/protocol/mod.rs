//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Client operation (get/put/delete/status)
//!     → messages.rs (Request envelope with correlation id)
//!     → transport codec (length-prefixed JSON frame)
//!     → member
//!     → Response envelope matched back by id
//! ```
//!
//! # Design Decisions
//! - Correlation ids let a connection skip frames left behind by
//!   requests that were canceled mid-flight
//! - Version is major/minor only; the gate compares against a single minimum

pub mod messages;
pub mod version;

pub use messages::{KeyValue, MemberStatus, Request, RequestBody, RequestId, Response, ResponseBody};
pub use version::{ClusterVersion, MIN_CLUSTER_VERSION};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_unique() {
        let a = Request::status();
        let b = Request::status();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_request_wire_shape() {
        let req = Request::new(RequestBody::Range {
            key: "foo".into(),
            serializable: true,
        });
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["body"]["op"], "range");
        assert_eq!(value["body"]["key"], "foo");
        assert_eq!(value["body"]["serializable"], true);
    }

    #[test]
    fn test_status_response_decodes() {
        let raw = r#"{
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "body": {"kind": "status", "member_id": 7, "cluster_version": "3.4.0", "leader": 1}
        }"#;
        let resp: Response = serde_json::from_str(raw).unwrap();
        match resp.body {
            ResponseBody::Status(status) => {
                assert_eq!(status.member_id, 7);
                assert_eq!(status.cluster_version, ClusterVersion::new(3, 4));
                assert_eq!(status.leader, Some(1));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_op_names() {
        assert_eq!(RequestBody::Status.name(), "status");
        assert_eq!(
            RequestBody::DeleteRange { key: "k".into() }.name(),
            "delete_range"
        );
    }
}
