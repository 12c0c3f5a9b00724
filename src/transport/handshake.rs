//! Initial handshake: query member metadata before a connection is used.

use std::time::Duration;

use crate::error::TransportError;
use crate::protocol::{MemberStatus, Request, ResponseBody};
use crate::transport::MessageStream;

/// Why a status query did not yield metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("handshake transport error: {0}")]
    Transport(#[from] TransportError),

    /// The member answered, but not with status metadata.
    #[error("unexpected handshake reply: {0}")]
    Unexpected(String),
}

/// Send a status request and wait for the matching reply within `timeout`.
pub async fn query_status(
    stream: &mut dyn MessageStream,
    timeout: Duration,
) -> Result<MemberStatus, HandshakeError> {
    let request = Request::status();

    let exchange = async {
        stream.send(&request).await.map_err(HandshakeError::Transport)?;
        loop {
            let response = stream.recv().await.map_err(HandshakeError::Transport)?;
            if response.id != request.id {
                continue;
            }
            return match response.body {
                ResponseBody::Status(status) => Ok(status),
                ResponseBody::Error { message } => Err(HandshakeError::Unexpected(message)),
                other => Err(HandshakeError::Unexpected(format!("{:?}", other))),
            };
        }
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(HandshakeError::Transport(TransportError::Timeout(
            timeout.as_millis() as u64,
        ))),
    }
}
