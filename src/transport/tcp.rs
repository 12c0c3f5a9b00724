//! TCP transport.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::error::TransportError;
use crate::protocol::{Request, Response};
use crate::transport::codec::FrameCodec;
use crate::transport::{MessageStream, Transport};

/// Dials members over plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn dial(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn MessageStream>, TransportError> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::Connect(format!("{}: {}", address, e)));
            }
            Err(_) => return Err(TransportError::Timeout(timeout.as_millis() as u64)),
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(address = %address, error = %e, "Failed to set TCP_NODELAY");
        }

        tracing::trace!(address = %address, "TCP stream established");
        Ok(Box::new(TcpMessageStream {
            framed: Framed::new(stream, FrameCodec::new()),
        }))
    }
}

/// Framed stream over a TCP socket.
#[derive(Debug)]
pub struct TcpMessageStream {
    framed: Framed<TcpStream, FrameCodec<Response>>,
}

#[async_trait]
impl MessageStream for TcpMessageStream {
    async fn send(&mut self, request: &Request) -> Result<(), TransportError> {
        self.framed.send(request).await
    }

    async fn recv(&mut self) -> Result<Response, TransportError> {
        self.framed.next().await.unwrap_or(Err(TransportError::Closed))
    }

    async fn shutdown(&mut self) {
        let _ = self.framed.get_mut().shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseBody;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio_util::bytes::BytesMut;
    use tokio_util::codec::Encoder;

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpTransport::new().dial(&addr, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn test_round_trip_with_echo_member() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, FrameCodec::<Request>::new());
            let request = framed.next().await.unwrap().unwrap();
            let response = Response::new(request.id, ResponseBody::DeleteRange { deleted: 1 });
            framed.send(&response).await.unwrap();
        });

        let mut stream = TcpTransport::new()
            .dial(&addr, Duration::from_secs(1))
            .await
            .unwrap();
        let request = Request::status();
        stream.send(&request).await.unwrap();
        let response = stream.recv().await.unwrap();
        assert_eq!(response.id, request.id);
        assert_eq!(response.body, ResponseBody::DeleteRange { deleted: 1 });

        // Member hung up after one exchange.
        assert_eq!(stream.recv().await.unwrap_err(), TransportError::Closed);
    }

    #[tokio::test]
    async fn test_recv_dropped_mid_frame_keeps_stream_aligned() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, FrameCodec::<Request>::new());
            let request = framed.next().await.unwrap().unwrap();

            let mut frame = BytesMut::new();
            FrameCodec::<Request>::new()
                .encode(Response::new(request.id, ResponseBody::Put { revision: 7 }), &mut frame)
                .unwrap();
            let half = frame.len() / 2;
            let socket = framed.get_mut();
            socket.write_all(&frame[..half]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            socket.write_all(&frame[half..]).await.unwrap();

            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest).await;
        });

        let mut stream = TcpTransport::new()
            .dial(&addr, Duration::from_secs(1))
            .await
            .unwrap();
        let request = Request::status();
        stream.send(&request).await.unwrap();

        // Give up while only half the frame has arrived.
        let first = tokio::time::timeout(Duration::from_millis(80), stream.recv()).await;
        assert!(first.is_err());

        let response = stream.recv().await.unwrap();
        assert_eq!(response.id, request.id);
        assert_eq!(response.body, ResponseBody::Put { revision: 7 });
    }
}
