//! Dialer: endpoint → usable connection.
//!
//! # Responsibilities
//! - Establish a transport connection within the dial timeout
//! - Optionally run the version handshake and reject old clusters
//! - Classify failures as transient or incompatible

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::balancer::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::DialError;
use crate::observability::metrics;
use crate::protocol::MIN_CLUSTER_VERSION;
use crate::transport::handshake::query_status;
use crate::transport::Transport;

/// Dials endpoints with a fixed timeout and version policy.
#[derive(Clone)]
pub struct Dialer {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    gate_version: bool,
}

impl Dialer {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration, gate_version: bool) -> Self {
        Self {
            transport,
            timeout,
            gate_version,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn gates_version(&self) -> bool {
        self.gate_version
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Dial `endpoint`. Transport connect and handshake together are bounded
    /// by the dial timeout.
    pub async fn dial(&self, endpoint: &Endpoint) -> Result<Connection, DialError> {
        let address = endpoint.address();
        let started = Instant::now();
        tracing::debug!(endpoint = %address, timeout_ms = self.timeout.as_millis() as u64, "Dialing endpoint");

        let result = self.dial_inner(endpoint, started).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(DialError::Transient { .. }) => "transient",
            Err(DialError::IncompatibleCluster { .. }) => "incompatible",
        };
        metrics::record_dial(address, outcome, started);

        match &result {
            Ok(conn) => tracing::debug!(
                endpoint = %address,
                connection_id = %conn.id(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Dial succeeded"
            ),
            Err(e) => tracing::debug!(endpoint = %address, error = %e, "Dial failed"),
        }
        result
    }

    async fn dial_inner(&self, endpoint: &Endpoint, started: Instant) -> Result<Connection, DialError> {
        let address = endpoint.address();
        let transient = |reason: String| DialError::Transient {
            endpoint: address.to_string(),
            reason,
        };

        let mut stream = self
            .transport
            .dial(endpoint.dial_target(), self.timeout)
            .await
            .map_err(|e| transient(e.to_string()))?;

        if !self.gate_version {
            return Ok(Connection::new(address, stream, None));
        }

        let remaining = self.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            stream.shutdown().await;
            return Err(transient("dial timeout elapsed before handshake".to_string()));
        }

        let status = match query_status(stream.as_mut(), remaining).await {
            Ok(status) => status,
            Err(e) => {
                stream.shutdown().await;
                return Err(transient(e.to_string()));
            }
        };

        if !status.cluster_version.is_supported() {
            stream.shutdown().await;
            tracing::warn!(
                endpoint = %address,
                reported = %status.cluster_version,
                minimum = %MIN_CLUSTER_VERSION,
                "Rejecting member running an old cluster version"
            );
            return Err(DialError::IncompatibleCluster {
                endpoint: address.to_string(),
                reported: status.cluster_version,
                minimum: MIN_CLUSTER_VERSION,
            });
        }

        Ok(Connection::new(address, stream, Some(status.cluster_version)))
    }
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("timeout", &self.timeout)
            .field("gate_version", &self.gate_version)
            .finish()
    }
}
