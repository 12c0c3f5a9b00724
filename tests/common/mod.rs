//! Shared utilities for integration tests: in-process cluster members that
//! speak the framed protocol over real TCP.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Encoder, Framed};

use cluster_client::protocol::{
    ClusterVersion, KeyValue, MemberStatus, Request, RequestBody, Response, ResponseBody,
};
use cluster_client::transport::codec::FrameCodec;
use cluster_client::{ClientConfig, RequestContext};

pub const CURRENT_VERSION: ClusterVersion = ClusterVersion::new(3, 4);
pub const OLD_VERSION: ClusterVersion = ClusterVersion::new(3, 1);

/// Key space shared by the members of one mock cluster.
#[derive(Clone, Default)]
pub struct Store {
    data: Arc<Mutex<HashMap<String, KeyValue>>>,
    revision: Arc<AtomicU64>,
}

impl Store {
    fn get(&self, key: &str) -> Option<KeyValue> {
        self.data.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> u64 {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        self.data.lock().unwrap().insert(
            key.to_string(),
            KeyValue {
                key: key.to_string(),
                value: value.to_string(),
                mod_revision: revision,
            },
        );
        revision
    }

    fn delete(&self, key: &str) -> u64 {
        self.data.lock().unwrap().remove(key).map_or(0, |_| 1)
    }
}

struct MemberState {
    id: u64,
    version: Mutex<ClusterVersion>,
    partitioned: AtomicBool,
    split_reply: Mutex<Option<Duration>>,
    accepts: AtomicUsize,
    open: AtomicUsize,
    store: Store,
}

/// One mock member.
pub struct MockMember {
    addr: String,
    state: Arc<MemberState>,
    stop_tx: watch::Sender<bool>,
}

impl MockMember {
    pub async fn start(id: u64, version: ClusterVersion, store: Store) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(MemberState {
            id,
            version: Mutex::new(version),
            partitioned: AtomicBool::new(false),
            split_reply: Mutex::new(None),
            accepts: AtomicUsize::new(0),
            open: AtomicUsize::new(0),
            store,
        });
        let (stop_tx, stop_rx) = watch::channel(false);

        tokio::spawn(accept_loop(listener, state.clone(), stop_rx));
        Self { addr, state, stop_tx }
    }

    pub fn addr(&self) -> String {
        self.addr.clone()
    }

    /// Close the listener and every open connection.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Alive, but cut off from the leader: linearizable reads and writes
    /// never complete, serializable reads and status still do.
    pub fn partition(&self) {
        self.state.partitioned.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.state.partitioned.store(false, Ordering::SeqCst);
    }

    /// Write the next reply in two halves, `pause` apart.
    pub fn split_next_reply(&self, pause: Duration) {
        *self.state.split_reply.lock().unwrap() = Some(pause);
    }

    pub fn set_version(&self, version: ClusterVersion) {
        *self.state.version.lock().unwrap() = version;
    }

    /// Number of TCP connections accepted so far.
    pub fn accepts(&self) -> usize {
        self.state.accepts.load(Ordering::SeqCst)
    }

    /// Number of connections currently being served.
    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }
}

impl Drop for MockMember {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A set of members sharing one key space.
pub struct MockCluster {
    pub members: Vec<MockMember>,
}

impl MockCluster {
    pub async fn start(size: usize, version: ClusterVersion) -> Self {
        let store = Store::default();
        let mut members = Vec::with_capacity(size);
        for id in 0..size {
            members.push(MockMember::start(id as u64 + 1, version, store.clone()).await);
        }
        Self { members }
    }

    pub fn addrs(&self) -> Vec<String> {
        self.members.iter().map(|m| m.addr()).collect()
    }

    pub fn member(&self, index: usize) -> &MockMember {
        &self.members[index]
    }

    /// Index of the member listening on `addr`.
    pub fn index_of(&self, addr: &str) -> Option<usize> {
        self.members.iter().position(|m| m.addr == addr)
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<MemberState>, mut stop_rx: watch::Receiver<bool>) {
    let conn_stop_rx = stop_rx.clone();
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.wait_for(|stopped| *stopped) => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, _)) => {
                    state.accepts.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(socket, state.clone(), conn_stop_rx.clone()));
                }
                Err(_) => break,
            },
        }
    }
}

async fn serve(socket: TcpStream, state: Arc<MemberState>, stop_rx: watch::Receiver<bool>) {
    state.open.fetch_add(1, Ordering::SeqCst);
    serve_frames(socket, &state, stop_rx).await;
    state.open.fetch_sub(1, Ordering::SeqCst);
}

async fn serve_frames(socket: TcpStream, state: &MemberState, mut stop_rx: watch::Receiver<bool>) {
    let mut framed = Framed::new(socket, FrameCodec::<Request>::new());
    loop {
        let request = tokio::select! {
            biased;
            _ = stop_rx.wait_for(|stopped| *stopped) => return,
            frame = framed.next() => match frame {
                Some(Ok(request)) => request,
                _ => return,
            },
        };

        let Some(body) = handle(state, &request.body) else {
            // Partitioned: swallow the request.
            continue;
        };
        let response = Response::new(request.id, body);

        let split = state.split_reply.lock().unwrap().take();
        let written = match split {
            Some(pause) => write_split(framed.get_mut(), &response, pause).await,
            None => framed.send(&response).await.is_ok(),
        };
        if !written {
            return;
        }
    }
}

async fn write_split(socket: &mut TcpStream, response: &Response, pause: Duration) -> bool {
    let mut frame = BytesMut::new();
    if FrameCodec::<Request>::new().encode(response, &mut frame).is_err() {
        return false;
    }
    let half = frame.len() / 2;
    if socket.write_all(&frame[..half]).await.is_err() {
        return false;
    }
    tokio::time::sleep(pause).await;
    socket.write_all(&frame[half..]).await.is_ok()
}

fn handle(state: &MemberState, body: &RequestBody) -> Option<ResponseBody> {
    let partitioned = state.partitioned.load(Ordering::SeqCst);
    let response = match body {
        RequestBody::Status => ResponseBody::Status(MemberStatus {
            member_id: state.id,
            cluster_version: *state.version.lock().unwrap(),
            leader: if partitioned { None } else { Some(1) },
        }),
        RequestBody::Range { key, serializable } => {
            if partitioned && !serializable {
                return None;
            }
            ResponseBody::Range {
                kv: state.store.get(key),
            }
        }
        RequestBody::Put { key, value } => {
            if partitioned {
                return None;
            }
            ResponseBody::Put {
                revision: state.store.put(key, value),
            }
        }
        RequestBody::DeleteRange { key } => {
            if partitioned {
                return None;
            }
            ResponseBody::DeleteRange {
                deleted: state.store.delete(key),
            }
        }
    };
    Some(response)
}

/// Client config for tests: short timeouts, fast retries.
pub fn client_config(endpoints: Vec<String>) -> ClientConfig {
    let mut config = ClientConfig::with_endpoints(endpoints);
    config.dial_timeout_ms = 1000;
    config.retries.base_delay_ms = 20;
    config.retries.max_delay_ms = 200;
    config
}

pub fn ctx(timeout: Duration) -> RequestContext {
    RequestContext::with_timeout(timeout)
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn eventually<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
