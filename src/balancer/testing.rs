//! In-memory transport for balancer tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TransportError;
use crate::protocol::{ClusterVersion, MemberStatus, Request, RequestBody, Response, ResponseBody};
use crate::transport::{MessageStream, Transport};

/// Scripted behaviour of one fake member. Changing it affects existing
/// streams too, so `set(addr, Refuse)` also kills open connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FakeMember {
    /// Dial fails immediately; open streams fail with a reset.
    Refuse,
    /// Dial never completes before the dial timeout.
    Hang,
    /// Dial succeeds but nothing is ever answered.
    Silent,
    /// Answers everything except linearizable reads, which hang.
    Partitioned(ClusterVersion),
    Healthy(ClusterVersion),
}

impl FakeMember {
    pub(crate) fn healthy(version: ClusterVersion) -> Self {
        FakeMember::Healthy(version)
    }
}

#[derive(Default)]
struct Shared {
    members: HashMap<String, FakeMember>,
    dials: HashMap<String, usize>,
    status_queries: HashMap<String, usize>,
}

pub(crate) struct FakeTransport {
    shared: Arc<Mutex<Shared>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Mutex::new(Shared::default())),
        })
    }

    pub(crate) fn set(&self, address: &str, member: FakeMember) {
        self.shared.lock().unwrap().members.insert(address.to_string(), member);
    }

    pub(crate) fn dials(&self, address: &str) -> usize {
        self.shared.lock().unwrap().dials.get(address).copied().unwrap_or(0)
    }

    pub(crate) fn total_dials(&self) -> usize {
        self.shared.lock().unwrap().dials.values().sum()
    }

    pub(crate) fn status_queries(&self, address: &str) -> usize {
        self.shared
            .lock()
            .unwrap()
            .status_queries
            .get(address)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn dial(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn MessageStream>, TransportError> {
        let member = {
            let mut shared = self.shared.lock().unwrap();
            *shared.dials.entry(address.to_string()).or_default() += 1;
            shared.members.get(address).cloned().unwrap_or(FakeMember::Refuse)
        };

        match member {
            FakeMember::Refuse => Err(TransportError::Connect(format!("{}: connection refused", address))),
            FakeMember::Hang => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout(timeout.as_millis() as u64))
            }
            _ => Ok(Box::new(FakeStream {
                address: address.to_string(),
                shared: self.shared.clone(),
                outbox: VecDeque::new(),
            })),
        }
    }
}

struct FakeStream {
    address: String,
    shared: Arc<Mutex<Shared>>,
    outbox: VecDeque<Response>,
}

impl FakeStream {
    fn member(&self) -> FakeMember {
        self.shared
            .lock()
            .unwrap()
            .members
            .get(&self.address)
            .cloned()
            .unwrap_or(FakeMember::Refuse)
    }
}

#[async_trait]
impl MessageStream for FakeStream {
    async fn send(&mut self, request: &Request) -> Result<(), TransportError> {
        let (version, partitioned) = match self.member() {
            FakeMember::Refuse | FakeMember::Hang => {
                return Err(TransportError::Io("connection reset by peer".into()))
            }
            FakeMember::Silent => return Ok(()),
            FakeMember::Partitioned(version) => (version, true),
            FakeMember::Healthy(version) => (version, false),
        };

        let body = match &request.body {
            RequestBody::Status => {
                let mut shared = self.shared.lock().unwrap();
                *shared.status_queries.entry(self.address.clone()).or_default() += 1;
                ResponseBody::Status(MemberStatus {
                    member_id: self.address.len() as u64,
                    cluster_version: version,
                    leader: if partitioned { None } else { Some(1) },
                })
            }
            RequestBody::Range { serializable, .. } => {
                if partitioned && !serializable {
                    return Ok(());
                }
                ResponseBody::Range { kv: None }
            }
            RequestBody::Put { .. } => ResponseBody::Put { revision: 1 },
            RequestBody::DeleteRange { .. } => ResponseBody::DeleteRange { deleted: 0 },
        };
        self.outbox.push_back(Response::new(request.id, body));
        Ok(())
    }

    async fn recv(&mut self) -> Result<Response, TransportError> {
        if let Some(response) = self.outbox.pop_front() {
            return Ok(response);
        }
        if matches!(self.member(), FakeMember::Refuse | FakeMember::Hang) {
            return Err(TransportError::Closed);
        }
        std::future::pending::<()>().await;
        Err(TransportError::Closed)
    }

    async fn shutdown(&mut self) {}
}
