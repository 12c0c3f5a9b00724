//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! default every field so minimal configs only name the endpoints.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::balancer::{BalancerConfig, DEFAULT_DIAL_TIMEOUT};

/// Root configuration for a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Member addresses, `host:port` or `http(s)://host:port`. Required.
    pub endpoints: Vec<String>,

    /// Per-dial timeout in milliseconds. `0` selects the default.
    pub dial_timeout_ms: u64,

    /// Refuse members reporting a cluster version below the minimum.
    pub reject_old_cluster: bool,

    /// How long a failed endpoint is skipped by candidate selection.
    pub unhealthy_cooldown_ms: u64,

    /// Retry policy for idempotent convenience reads.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            dial_timeout_ms: DEFAULT_DIAL_TIMEOUT.as_millis() as u64,
            reject_old_cluster: false,
            unhealthy_cooldown_ms: 5000,
            retries: RetryConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Config with the given endpoints and defaults elsewhere.
    pub fn with_endpoints<S: Into<String>>(endpoints: impl IntoIterator<Item = S>) -> Self {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        match self.dial_timeout_ms {
            0 => DEFAULT_DIAL_TIMEOUT,
            ms => Duration::from_millis(ms),
        }
    }

    pub fn unhealthy_cooldown(&self) -> Duration {
        Duration::from_millis(self.unhealthy_cooldown_ms)
    }

    pub fn balancer_config(&self) -> BalancerConfig {
        BalancerConfig {
            dial_timeout: self.dial_timeout(),
            reject_old_cluster: self.reject_old_cluster,
            unhealthy_cooldown: self.unhealthy_cooldown(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
