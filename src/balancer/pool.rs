//! Connection pool / balancer state machine.
//!
//! # Responsibilities
//! - Own the Endpoint Set and the single active connection under one lock
//! - Run dial cycles (round-robin with avoidance) off the lock
//! - React to transport failures reported by the router
//! - Apply endpoint replacements without disturbing surviving connections
//! - Publish failover notifications

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};

use crate::balancer::connection::Connection;
use crate::balancer::dialer::Dialer;
use crate::balancer::round_robin::candidate_order;
use crate::balancer::{BalancerConfig, BalancerEvent};
use crate::endpoint::{Endpoint, EndpointDiff, EndpointSet};
use crate::error::{ClientError, DialError, TransportError};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::observability::metrics;
use crate::transport::Transport;

const EVENT_CAPACITY: usize = 64;

/// Externally visible balancer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancerState {
    NoConnection,
    Dialing,
    Ready,
    Closed,
}

enum State {
    /// No usable connection. `last_error` is set when the previous dial
    /// cycle exhausted every candidate.
    NoConnection { last_error: Option<DialError> },
    /// A dial cycle identified by `cycle` is in flight.
    Dialing { cycle: u64 },
    Ready(Arc<Connection>),
    Closed,
}

struct Inner {
    endpoints: EndpointSet,
    state: State,
    /// Endpoint the next cycle rotates away from.
    last_used: Option<String>,
    /// Id of the most recently started dial cycle.
    cycle: u64,
    /// Most recent failed dial attempt of the current cycle.
    last_failure: Option<DialError>,
}

impl Inner {
    fn is_dialing(&self, cycle: u64) -> bool {
        matches!(self.state, State::Dialing { cycle: c } if c == cycle)
    }
}

struct Shared {
    inner: Mutex<Inner>,
    dialer: Dialer,
    cooldown: Duration,
    pinned_tx: watch::Sender<Option<String>>,
    /// Bumped whenever a dial cycle resolves or the balancer closes.
    progress_tx: watch::Sender<u64>,
    events: broadcast::Sender<BalancerEvent>,
    shutdown: Shutdown,
}

/// Per-client balancer. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Balancer {
    shared: Arc<Shared>,
}

enum DialOutcome {
    Connected,
    Retry,
    Failed(DialError),
    Abandoned,
}

impl Balancer {
    pub fn new(endpoints: EndpointSet, transport: Arc<dyn Transport>, config: BalancerConfig) -> Self {
        let (pinned_tx, _) = watch::channel(None);
        let (progress_tx, _) = watch::channel(0);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        tracing::debug!(
            endpoints = ?endpoints.addresses(),
            dial_timeout_ms = config.dial_timeout.as_millis() as u64,
            reject_old_cluster = config.reject_old_cluster,
            "Balancer created"
        );

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    endpoints,
                    state: State::NoConnection { last_error: None },
                    last_used: None,
                    cycle: 0,
                    last_failure: None,
                }),
                dialer: Dialer::new(transport, config.dial_timeout, config.reject_old_cluster),
                cooldown: config.unhealthy_cooldown,
                pinned_tx,
                progress_tx,
                events,
                shutdown: Shutdown::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current connection, dialing one if there is none.
    ///
    /// While a dial cycle is in flight callers wait for it to resolve, for
    /// at most the dial timeout. If the cycle they waited on exhausts every
    /// candidate its error is returned; the balancer stays in
    /// `NoConnection` and the next call starts a fresh cycle. If the wait
    /// runs out first the cycle keeps going in the background and the
    /// latest dial failure is returned.
    pub async fn acquire(&self) -> Result<Arc<Connection>, ClientError> {
        let deadline = tokio::time::Instant::now() + self.shared.dialer.timeout();
        loop {
            let mut progress = self.shared.progress_tx.subscribe();
            let waiting_on = {
                let mut inner = self.lock();
                let in_flight = match &inner.state {
                    State::Closed => return Err(ClientError::ClientClosed),
                    State::Ready(conn) => return Ok(conn.clone()),
                    State::Dialing { cycle } => Some(*cycle),
                    State::NoConnection { .. } => None,
                };
                match in_flight {
                    Some(cycle) => cycle,
                    None => self.start_cycle(&mut inner),
                }
            };

            match tokio::time::timeout_at(deadline, progress.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(ClientError::ClientClosed),
                Err(_) => return self.wait_expired(),
            }

            let inner = self.lock();
            if let State::NoConnection {
                last_error: Some(err),
            } = &inner.state
            {
                if inner.cycle == waiting_on {
                    return Err(err.clone().into());
                }
            }
        }
    }

    /// Outcome of an `acquire` whose wait hit the dial timeout.
    fn wait_expired(&self) -> Result<Arc<Connection>, ClientError> {
        let inner = self.lock();
        let error = match &inner.state {
            State::Ready(conn) => return Ok(conn.clone()),
            State::Closed => return Err(ClientError::ClientClosed),
            State::NoConnection {
                last_error: Some(err),
            } => err.clone(),
            _ => inner.last_failure.clone().unwrap_or_else(|| DialError::Transient {
                endpoint: inner.endpoints.addresses().join(","),
                reason: format!(
                    "no connection within {} ms",
                    self.shared.dialer.timeout().as_millis()
                ),
            }),
        };

        tracing::debug!(error = %error, "Gave up waiting for dial cycle");
        Err(error.into())
    }

    /// Report that `conn` failed with a transport error.
    ///
    /// Only the active connection triggers a failover; reports about
    /// connections that were already replaced or released are ignored.
    pub fn report_failure(&self, conn: &Connection, error: &TransportError) {
        let mut inner = self.lock();
        let is_active = matches!(&inner.state, State::Ready(active) if active.id() == conn.id());
        if !is_active {
            tracing::trace!(connection_id = %conn.id(), endpoint = %conn.endpoint(), "Ignoring failure report for stale connection");
            return;
        }

        conn.close();
        inner.endpoints.mark_unhealthy(conn.endpoint(), error.to_string());
        inner.last_used = Some(conn.endpoint().to_string());
        self.start_cycle(&mut inner);
        drop(inner);

        tracing::info!(
            endpoint = %conn.endpoint(),
            connection_id = %conn.id(),
            error = %error,
            "Connection failed, failing over"
        );
        metrics::record_failover(conn.endpoint());
        metrics::record_endpoint_health(conn.endpoint(), false);
        self.shared.pinned_tx.send_replace(None);
        let _ = self.shared.events.send(BalancerEvent::Failover {
            from: conn.endpoint().to_string(),
            reason: error.to_string(),
        });
    }

    /// Replace the endpoint set.
    ///
    /// The new set is visible as soon as this returns. If the active
    /// connection's endpoint was removed the connection is released and a
    /// dial cycle against the new set starts in the background; a surviving
    /// active connection is left untouched.
    pub fn set_endpoints<S: AsRef<str>>(&self, addresses: &[S]) -> Result<EndpointDiff, ClientError> {
        let mut inner = self.lock();
        if matches!(inner.state, State::Closed) {
            return Err(ClientError::ClientClosed);
        }

        let diff = inner.endpoints.replace(addresses)?;

        let released = match &inner.state {
            State::Ready(conn) if diff.removes(conn.endpoint()) => Some(conn.clone()),
            _ => None,
        };
        if let Some(conn) = &released {
            conn.close();
            inner.last_used = None;
            self.start_cycle(&mut inner);
        }
        let current = inner.endpoints.addresses();
        drop(inner);

        if let Some(conn) = released {
            tracing::info!(
                endpoint = %conn.endpoint(),
                connection_id = %conn.id(),
                "Active endpoint removed, reconnecting against new set"
            );
            self.shared.pinned_tx.send_replace(None);
        }

        if diff.is_empty() {
            tracing::debug!(endpoints = ?current, "Endpoint set unchanged");
        } else {
            tracing::info!(
                added = ?diff.added,
                removed = ?diff.removed,
                endpoints = ?current,
                "Endpoint set replaced"
            );
            metrics::record_endpoints_replaced();
            let _ = self.shared.events.send(BalancerEvent::EndpointsReplaced {
                added: diff.added.clone(),
                removed: diff.removed.clone(),
            });
        }
        Ok(diff)
    }

    /// Enter the terminal state: release the connection, stop in-flight
    /// dials and fail waiting callers with `ClientClosed`. Idempotent.
    pub fn close(&self) {
        let previous = {
            let mut inner = self.lock();
            if matches!(inner.state, State::Closed) {
                return;
            }
            std::mem::replace(&mut inner.state, State::Closed)
        };

        if let State::Ready(conn) = previous {
            conn.close();
        }
        self.shared.shutdown.trigger();
        self.shared.pinned_tx.send_replace(None);
        self.shared.progress_tx.send_modify(|n| *n += 1);
        let _ = self.shared.events.send(BalancerEvent::Closed);
        tracing::info!("Balancer closed");
    }

    pub fn state(&self) -> BalancerState {
        match self.lock().state {
            State::NoConnection { .. } => BalancerState::NoConnection,
            State::Dialing { .. } => BalancerState::Dialing,
            State::Ready(_) => BalancerState::Ready,
            State::Closed => BalancerState::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == BalancerState::Closed
    }

    /// Addresses of the current endpoint set, in order.
    pub fn endpoints(&self) -> Vec<String> {
        self.lock().endpoints.addresses()
    }

    /// Snapshot of the endpoint set including health bookkeeping.
    pub fn endpoint_snapshot(&self) -> Vec<Endpoint> {
        self.lock().endpoints.as_slice().to_vec()
    }

    /// Endpoint of the active connection, if one is ready.
    pub fn active_endpoint(&self) -> Option<String> {
        match &self.lock().state {
            State::Ready(conn) => Some(conn.endpoint().to_string()),
            _ => None,
        }
    }

    /// Error of the last exhausted dial cycle, while no connection exists.
    pub fn last_error(&self) -> Option<DialError> {
        match &self.lock().state {
            State::NoConnection { last_error } => last_error.clone(),
            _ => None,
        }
    }

    pub fn dialer(&self) -> &Dialer {
        &self.shared.dialer
    }

    pub fn dial_timeout(&self) -> Duration {
        self.shared.dialer.timeout()
    }

    /// Failover and reconfiguration notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BalancerEvent> {
        self.shared.events.subscribe()
    }

    /// Endpoint of the preferred connection; `None` while there is none.
    pub fn watch_pinned(&self) -> watch::Receiver<Option<String>> {
        self.shared.pinned_tx.subscribe()
    }

    pub(crate) fn shutdown_signal(&self) -> ShutdownSignal {
        self.shared.shutdown.subscribe()
    }

    /// Start a new dial cycle. Must be called with the lock held.
    fn start_cycle(&self, inner: &mut Inner) -> u64 {
        inner.cycle += 1;
        inner.last_failure = None;
        let cycle = inner.cycle;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                inner.state = State::Dialing { cycle };
                let balancer = self.clone();
                handle.spawn(async move { balancer.run_cycle(cycle).await });
            }
            Err(_) => {
                // Outside a runtime the next acquire dials instead.
                tracing::debug!(cycle, "No runtime available, deferring dial");
                inner.state = State::NoConnection { last_error: None };
            }
        }
        cycle
    }

    /// Try candidates until one dials, the set is exhausted, or the cycle is
    /// superseded (close, endpoint removal, newer cycle).
    async fn run_cycle(self, cycle: u64) {
        let mut shutdown = self.shared.shutdown.subscribe();
        let mut tried: HashSet<String> = HashSet::new();
        let mut incompatible: Option<DialError> = None;
        let mut last_error: Option<DialError> = None;

        tracing::debug!(cycle, "Dial cycle started");

        loop {
            let endpoint = {
                let inner = self.lock();
                if !inner.is_dialing(cycle) {
                    return;
                }
                candidate_order(
                    &inner.endpoints,
                    inner.last_used.as_deref(),
                    Instant::now(),
                    self.shared.cooldown,
                )
                .into_iter()
                .find(|address| !tried.contains(address))
                .and_then(|address| inner.endpoints.get(&address).cloned())
            };
            let Some(endpoint) = endpoint else {
                break;
            };
            tried.insert(endpoint.address().to_string());

            let result = tokio::select! {
                _ = shutdown.recv() => return,
                result = self.shared.dialer.dial(&endpoint) => result,
            };

            match self.publish_dial(cycle, &endpoint, result) {
                DialOutcome::Connected | DialOutcome::Abandoned => return,
                DialOutcome::Retry => continue,
                DialOutcome::Failed(err) => {
                    if err.is_incompatible_cluster() {
                        incompatible = Some(err);
                    } else {
                        last_error = Some(err);
                    }
                }
            }
        }

        let error = incompatible.or(last_error).unwrap_or_else(|| DialError::Transient {
            endpoint: String::new(),
            reason: "no endpoint could be tried".to_string(),
        });
        self.exhaust(cycle, error);
    }

    /// Apply one dial result under the lock.
    fn publish_dial(
        &self,
        cycle: u64,
        endpoint: &Endpoint,
        result: Result<Connection, DialError>,
    ) -> DialOutcome {
        let address = endpoint.address();
        let mut inner = self.lock();

        if !inner.is_dialing(cycle) {
            if let Ok(conn) = result {
                conn.close();
            }
            return DialOutcome::Abandoned;
        }

        match result {
            Ok(conn) => {
                if !inner.endpoints.contains(address) {
                    tracing::debug!(endpoint = %address, "Dialed endpoint was removed meanwhile, discarding");
                    conn.close();
                    return DialOutcome::Retry;
                }

                inner.endpoints.mark_healthy(address);
                inner.last_used = Some(address.to_string());
                let conn = Arc::new(conn);
                inner.state = State::Ready(conn.clone());
                drop(inner);

                tracing::info!(
                    endpoint = %address,
                    connection_id = %conn.id(),
                    cluster_version = ?conn.cluster_version(),
                    "Connected"
                );
                metrics::record_endpoint_health(address, true);
                self.shared.pinned_tx.send_replace(Some(address.to_string()));
                self.shared.progress_tx.send_modify(|n| *n += 1);
                let _ = self.shared.events.send(BalancerEvent::Connected {
                    endpoint: address.to_string(),
                });
                DialOutcome::Connected
            }
            Err(err) => {
                inner.endpoints.mark_unhealthy(address, err.to_string());
                inner.last_failure = Some(err.clone());
                drop(inner);

                tracing::debug!(endpoint = %address, error = %err, "Candidate failed, advancing");
                metrics::record_endpoint_health(address, false);
                DialOutcome::Failed(err)
            }
        }
    }

    fn exhaust(&self, cycle: u64, error: DialError) {
        {
            let mut inner = self.lock();
            if !inner.is_dialing(cycle) {
                return;
            }
            inner.state = State::NoConnection {
                last_error: Some(error.clone()),
            };
            inner.last_used = None;
        }

        tracing::warn!(cycle, error = %error, "All endpoints failed to dial");
        self.shared.progress_tx.send_modify(|n| *n += 1);
        let _ = self.shared.events.send(BalancerEvent::Exhausted { error });
    }
}

impl std::fmt::Debug for Balancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Balancer")
            .field("state", &self.state())
            .field("endpoints", &self.endpoints())
            .field("dialer", &self.shared.dialer)
            .finish()
    }
}
