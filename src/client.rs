//! Client session: configuration, balancer, router and the public API.
//!
//! # Responsibilities
//! - Validate configuration and perform the first dial cycle
//! - Expose `set_endpoints` and `close`
//! - Thin key-value operations over the router
//! - Optional hot reload of the endpoint list from a config file
//!
//! # Design Decisions
//! - Each client owns its balancer; nothing is process-global
//! - Construction is bounded by the dial timeout as a whole, not per endpoint
//! - Reads and status queries retry per `ClientConfig::retries`; writes are
//!   sent once

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use crate::balancer::{Balancer, BalancerEvent};
use crate::config::{validate_config, ClientConfig, ConfigError, ConfigWatcher};
use crate::endpoint::{EndpointDiff, EndpointSet, HealthState};
use crate::error::{ClientError, ClientResult, DialError};
use crate::protocol::{KeyValue, MemberStatus, Request, RequestBody, ResponseBody};
use crate::resilience::{retry, run_with_context, RetryPolicy};
use crate::router::{RequestContext, Router};
use crate::transport::handshake::{query_status, HandshakeError};
use crate::transport::{TcpTransport, Transport};

/// Status of one configured endpoint, queried over a dedicated connection.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointStatus {
    pub endpoint: String,
    pub health: HealthState,
    pub status: ClientResult<MemberStatus>,
}

/// A client for the cluster. Dropping it closes it.
pub struct Client {
    balancer: Balancer,
    router: Router,
    config: Arc<ArcSwap<ClientConfig>>,
    retry_policy: RetryPolicy,
}

impl Client {
    /// Connect over TCP.
    pub async fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::with_transport(config, Arc::new(TcpTransport::new())).await
    }

    /// Connect over a caller-supplied transport.
    ///
    /// Fails with `InvalidConfiguration` for a bad config, or with the dial
    /// error when no endpoint yields a usable connection within the dial
    /// timeout. With `reject_old_cluster` set, a cluster that only offers
    /// old members fails with `IncompatibleCluster`.
    pub async fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> ClientResult<Self> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let endpoints = EndpointSet::new(&config.endpoints)?;
        let balancer = Balancer::new(endpoints, transport, config.balancer_config());
        let dial_timeout = config.dial_timeout();

        let ctx = RequestContext::with_timeout(dial_timeout);
        match run_with_context(&ctx, balancer.acquire()).await {
            Ok(conn) => {
                tracing::info!(
                    endpoint = %conn.endpoint(),
                    endpoints = ?config.endpoints,
                    "Client connected"
                );
            }
            Err(e) => {
                let error = match e {
                    ClientError::DeadlineExceeded => balancer
                        .last_error()
                        .map(ClientError::Dial)
                        .unwrap_or_else(|| {
                            ClientError::Dial(DialError::Transient {
                                endpoint: config.endpoints.join(","),
                                reason: format!(
                                    "no endpoint reachable within {} ms",
                                    dial_timeout.as_millis()
                                ),
                            })
                        }),
                    other => other,
                };
                balancer.close();
                tracing::warn!(error = %error, "Client construction failed");
                return Err(error);
            }
        }

        let retry_policy = RetryPolicy::from_config(&config.retries);
        Ok(Self {
            router: Router::new(balancer.clone()),
            balancer,
            config: Arc::new(ArcSwap::from_pointee(config)),
            retry_policy,
        })
    }

    /// Replace the endpoint list. See [`Balancer::set_endpoints`].
    pub fn set_endpoints<S: AsRef<str>>(&self, addresses: &[S]) -> ClientResult<EndpointDiff> {
        let diff = self.balancer.set_endpoints(addresses)?;
        let endpoints = self.balancer.endpoints();
        self.config.rcu(|current| {
            let mut next = ClientConfig::clone(current);
            next.endpoints = endpoints.clone();
            next
        });
        Ok(diff)
    }

    /// Release every connection and stop background work. Idempotent.
    pub fn close(&self) {
        self.balancer.close();
    }

    pub fn is_closed(&self) -> bool {
        self.balancer.is_closed()
    }

    /// Read `key`. Linearizable unless `serializable`, in which case any
    /// member may answer from its local state.
    pub async fn get(&self, ctx: &RequestContext, key: &str, serializable: bool) -> ClientResult<Option<KeyValue>> {
        let body = RequestBody::Range {
            key: key.to_string(),
            serializable,
        };
        match self.send_retried(ctx, body).await? {
            ResponseBody::Range { kv } => Ok(kv),
            other => Err(unexpected("range", &other)),
        }
    }

    /// Write `key`, returning the new revision. Sent once.
    pub async fn put(&self, ctx: &RequestContext, key: &str, value: &str) -> ClientResult<u64> {
        let request = Request::new(RequestBody::Put {
            key: key.to_string(),
            value: value.to_string(),
        });
        match self.router.call(ctx, request).await? {
            ResponseBody::Put { revision } => Ok(revision),
            other => Err(unexpected("put", &other)),
        }
    }

    /// Delete `key`, returning how many keys were removed. Sent once.
    pub async fn delete(&self, ctx: &RequestContext, key: &str) -> ClientResult<u64> {
        let request = Request::new(RequestBody::DeleteRange { key: key.to_string() });
        match self.router.call(ctx, request).await? {
            ResponseBody::DeleteRange { deleted } => Ok(deleted),
            other => Err(unexpected("delete_range", &other)),
        }
    }

    /// Status of the member behind the active connection.
    pub async fn status(&self, ctx: &RequestContext) -> ClientResult<MemberStatus> {
        match self.send_retried(ctx, RequestBody::Status).await? {
            ResponseBody::Status(status) => Ok(status),
            other => Err(unexpected("status", &other)),
        }
    }

    async fn send_retried(&self, ctx: &RequestContext, body: RequestBody) -> ClientResult<ResponseBody> {
        retry(&self.retry_policy, ctx, |_| self.router.call(ctx, Request::new(body.clone()))).await
    }

    /// Query every configured endpoint concurrently, each over its own
    /// short-lived connection bounded by the dial timeout. Does not touch
    /// the balancer's active connection or health bookkeeping.
    pub async fn member_statuses(&self) -> ClientResult<Vec<EndpointStatus>> {
        if self.is_closed() {
            return Err(ClientError::ClientClosed);
        }

        let timeout = self.balancer.dial_timeout();
        let transport = self.balancer.dialer().transport().clone();
        let queries = self.balancer.endpoint_snapshot().into_iter().map(|endpoint| {
            let transport = transport.clone();
            async move {
                let status = query_endpoint(transport.as_ref(), endpoint.dial_target(), endpoint.address(), timeout).await;
                EndpointStatus {
                    endpoint: endpoint.address().to_string(),
                    health: endpoint.health(),
                    status,
                }
            }
        });
        Ok(join_all(queries).await)
    }

    /// Follow `path` and apply endpoint-list changes as they are written.
    /// Invalid reloads are logged and ignored. Stops when the client closes.
    pub fn watch_config(&self, path: &Path) -> ClientResult<()> {
        if self.is_closed() {
            return Err(ClientError::ClientClosed);
        }

        let (watcher, mut updates) = ConfigWatcher::new(path);
        let handle = watcher.run().map_err(|e| {
            ClientError::InvalidConfiguration(format!("cannot watch {}: {}", path.display(), e))
        })?;

        let balancer = self.balancer.clone();
        let config = self.config.clone();
        let mut shutdown = self.balancer.shutdown_signal();
        tokio::spawn(async move {
            let _watcher = handle;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    update = updates.recv() => match update {
                        Some(next) => apply_reload(&balancer, &config, next),
                        None => break,
                    },
                }
            }
            tracing::debug!("Config reload task stopped");
        });
        Ok(())
    }

    /// Current endpoint addresses, in order.
    pub fn endpoints(&self) -> Vec<String> {
        self.balancer.endpoints()
    }

    /// Endpoint of the active connection, if one is ready.
    pub fn active_endpoint(&self) -> Option<String> {
        self.balancer.active_endpoint()
    }

    pub fn dial_timeout(&self) -> Duration {
        self.balancer.dial_timeout()
    }

    /// Snapshot of the live configuration.
    pub fn config(&self) -> Arc<ClientConfig> {
        self.config.load_full()
    }

    /// Balancer notifications (connects, failovers, reconfiguration).
    pub fn subscribe(&self) -> broadcast::Receiver<BalancerEvent> {
        self.balancer.subscribe()
    }

    pub fn watch_pinned(&self) -> watch::Receiver<Option<String>> {
        self.balancer.watch_pinned()
    }

    pub fn balancer(&self) -> &Balancer {
        &self.balancer
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.balancer.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("balancer", &self.balancer)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

fn unexpected(op: &str, body: &ResponseBody) -> ClientError {
    ClientError::Remote(format!("unexpected response to {}: {:?}", op, body))
}

async fn query_endpoint(
    transport: &dyn Transport,
    target: &str,
    address: &str,
    timeout: Duration,
) -> ClientResult<MemberStatus> {
    let transport_error = |source| ClientError::Transport {
        endpoint: address.to_string(),
        source,
    };

    let mut stream = transport.dial(target, timeout).await.map_err(transport_error)?;
    let result = query_status(stream.as_mut(), timeout).await;
    stream.shutdown().await;

    result.map_err(|e| match e {
        HandshakeError::Transport(source) => transport_error(source),
        HandshakeError::Unexpected(message) => ClientError::Remote(message),
    })
}

fn apply_reload(balancer: &Balancer, config: &ArcSwap<ClientConfig>, next: ClientConfig) {
    let current = config.load();
    if next.endpoints == current.endpoints {
        tracing::debug!("Config reloaded, endpoint list unchanged");
        return;
    }

    match balancer.set_endpoints(&next.endpoints) {
        Ok(diff) => {
            tracing::info!(added = ?diff.added, removed = ?diff.removed, "Applied endpoints from config reload");
            let mut updated = ClientConfig::clone(&current);
            updated.endpoints = next.endpoints;
            config.store(Arc::new(updated));
        }
        Err(e) => tracing::warn!(error = %e, "Rejected endpoints from config reload"),
    }
}
