//! Live connections owned by the balancer.
//!
//! # Responsibilities
//! - Wrap a transport handle bound to one endpoint
//! - Serialize request/response exchanges over the shared stream
//! - Track connection state (Ready → Failed/Closed)
//! - Abort in-flight exchanges when released

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::protocol::{ClusterVersion, Request, Response};
use crate::transport::MessageStream;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state. Dialing is tracked by the balancer, not here: a
/// `Connection` only exists once the dial succeeded.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Ready = 0,
    Failed = 1,
    Closed = 2,
}

impl From<u8> for ConnectionState {
    fn from(val: u8) -> Self {
        match val {
            0 => ConnectionState::Ready,
            1 => ConnectionState::Failed,
            _ => ConnectionState::Closed,
        }
    }
}

/// A connection to one cluster member.
pub struct Connection {
    id: ConnectionId,
    endpoint: String,
    cluster_version: Option<ClusterVersion>,
    stream: Mutex<Box<dyn MessageStream>>,
    state: AtomicU8,
    released: CancellationToken,
}

impl Connection {
    pub(crate) fn new(
        endpoint: impl Into<String>,
        stream: Box<dyn MessageStream>,
        cluster_version: Option<ClusterVersion>,
    ) -> Self {
        Self {
            id: ConnectionId::next(),
            endpoint: endpoint.into(),
            cluster_version,
            stream: Mutex::new(stream),
            state: AtomicU8::new(ConnectionState::Ready as u8),
            released: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address of the endpoint this connection was dialed from.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Version reported during the handshake, if one was performed.
    pub fn cluster_version(&self) -> Option<ClusterVersion> {
        self.cluster_version
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Send `request` and wait for the response carrying the same id.
    ///
    /// Exchanges are serialized on the stream. A caller may drop this future
    /// at any point; the stream stays aligned and the reply to the abandoned
    /// request is skipped by the next exchange. Releasing the connection aborts the
    /// exchange with `TransportError::Closed`.
    pub async fn call(&self, request: &Request) -> Result<Response, TransportError> {
        if self.state() == ConnectionState::Closed {
            return Err(TransportError::Closed);
        }

        let exchange = async {
            let mut stream = self.stream.lock().await;
            stream.send(request).await?;
            loop {
                let response = stream.recv().await?;
                if response.id == request.id {
                    return Ok(response);
                }
                tracing::debug!(
                    connection_id = %self.id,
                    endpoint = %self.endpoint,
                    stale_id = %response.id,
                    "Skipping response to abandoned request"
                );
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.released.cancelled() => Err(TransportError::Closed),
            result = exchange => result,
        };

        if result.is_err() {
            self.mark_failed();
        }
        result
    }

    /// Ready → Failed. A closed connection stays closed.
    pub(crate) fn mark_failed(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Ready as u8,
            ConnectionState::Failed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Release the connection. In-flight exchanges fail; the socket is
    /// dropped with the last reference.
    pub(crate) fn close(&self) {
        let previous = self.state.swap(ConnectionState::Closed as u8, Ordering::AcqRel);
        if previous != ConnectionState::Closed as u8 {
            self.released.cancel();
            tracing::debug!(connection_id = %self.id, endpoint = %self.endpoint, "Connection released");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("cluster_version", &self.cluster_version)
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        tracing::trace!(connection_id = %self.id, endpoint = %self.endpoint, "Connection dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestBody, ResponseBody};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    /// Replies to each request with a canned frame sequence.
    struct ScriptedStream {
        pending: VecDeque<Response>,
        stale_first: bool,
        hang: bool,
    }

    #[async_trait]
    impl MessageStream for ScriptedStream {
        async fn send(&mut self, request: &Request) -> Result<(), TransportError> {
            if self.stale_first {
                self.pending.push_back(Response::error(uuid::Uuid::new_v4(), "stale"));
            }
            self.pending
                .push_back(Response::new(request.id, ResponseBody::Put { revision: 9 }));
            Ok(())
        }

        async fn recv(&mut self) -> Result<Response, TransportError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.pending.pop_front().ok_or(TransportError::Closed)
        }

        async fn shutdown(&mut self) {}
    }

    fn scripted(stale_first: bool, hang: bool) -> Box<dyn MessageStream> {
        Box::new(ScriptedStream {
            pending: VecDeque::new(),
            stale_first,
            hang,
        })
    }

    fn put_request() -> Request {
        Request::new(RequestBody::Put {
            key: "k".into(),
            value: "v".into(),
        })
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::next();
        let id2 = ConnectionId::next();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[tokio::test]
    async fn test_call_skips_stale_frames() {
        let conn = Connection::new("a:1", scripted(true, false), None);
        let request = put_request();
        let response = conn.call(&request).await.unwrap();
        assert_eq!(response.id, request.id);
        assert!(conn.is_ready());
    }

    #[tokio::test]
    async fn test_close_aborts_in_flight_call() {
        let conn = Arc::new(Connection::new("a:1", scripted(false, true), None));
        let c = conn.clone();
        let call = tokio::spawn(async move { c.call(&put_request()).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close();

        let result = tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .expect("call should finish once released")
            .unwrap();
        assert_eq!(result.unwrap_err(), TransportError::Closed);
        assert_eq!(conn.state(), ConnectionState::Closed);

        // Closed connections refuse new work.
        assert_eq!(conn.call(&put_request()).await.unwrap_err(), TransportError::Closed);
    }

    #[tokio::test]
    async fn test_transport_error_marks_failed() {
        struct Broken;

        #[async_trait]
        impl MessageStream for Broken {
            async fn send(&mut self, _request: &Request) -> Result<(), TransportError> {
                Err(TransportError::Io("reset".into()))
            }
            async fn recv(&mut self) -> Result<Response, TransportError> {
                Err(TransportError::Closed)
            }
            async fn shutdown(&mut self) {}
        }

        let conn = Connection::new("a:1", Box::new(Broken), None);
        assert!(conn.call(&put_request()).await.is_err());
        assert_eq!(conn.state(), ConnectionState::Failed);

        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
