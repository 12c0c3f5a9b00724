//! Metrics collection and exposition.
//!
//! # Metrics
//! - `client_dial_attempts_total` (counter): dials by endpoint, outcome
//! - `client_dial_duration_seconds` (histogram): dial + handshake latency
//! - `client_failovers_total` (counter): connections abandoned after a transport failure
//! - `client_endpoint_health` (gauge): 1=healthy, 0=unhealthy
//! - `client_endpoints_replaced_total` (counter): non-empty endpoint replacements
//! - `client_requests_total` (counter): requests by op, outcome
//! - `client_request_duration_seconds` (histogram): request latency by op
//!
//! Recording is a no-op until a recorder is installed, so library users who
//! never call [`init_metrics`] pay only for the macro dispatch.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and start its scrape listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dial(endpoint: &str, outcome: &'static str, start: Instant) {
    counter!(
        "client_dial_attempts_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("client_dial_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_failover(from: &str) {
    counter!("client_failovers_total", "from" => from.to_string()).increment(1);
}

pub fn record_endpoint_health(endpoint: &str, healthy: bool) {
    gauge!("client_endpoint_health", "endpoint" => endpoint.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_endpoints_replaced() {
    counter!("client_endpoints_replaced_total").increment(1);
}

pub fn record_request(op: &'static str, outcome: &'static str, start: Instant) {
    counter!("client_requests_total", "op" => op, "outcome" => outcome).increment(1);
    histogram!("client_request_duration_seconds", "op" => op)
        .record(start.elapsed().as_secs_f64());
}
