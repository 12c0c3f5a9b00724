//! A single cluster member as known to the client.
//!
//! # Responsibilities
//! - Parse and validate the configured address
//! - Track health state (Unknown/Healthy/Unhealthy)
//! - Remember the last error and last dial attempt

use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

/// Health State enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown,
    Healthy,
    Unhealthy,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Reason an address string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("endpoint address is empty")]
    Empty,
    #[error("endpoint '{0}' is malformed: {1}")]
    Malformed(String, String),
    #[error("endpoint '{0}' uses unsupported scheme '{1}'")]
    UnsupportedScheme(String, String),
}

/// One cluster member.
///
/// Identity is the address string exactly as configured; `dial_target` is the
/// `host:port` form handed to the transport.
#[derive(Debug, Clone)]
pub struct Endpoint {
    address: String,
    dial_target: String,
    health: HealthState,
    last_error: Option<String>,
    last_attempt: Option<Instant>,
    unhealthy_since: Option<Instant>,
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Endpoint {}

impl Endpoint {
    /// Parse an address of the form `host:port` or `http[s]://host:port`.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let address = raw.trim();
        if address.is_empty() {
            return Err(AddressError::Empty);
        }
        if address.chars().any(char::is_whitespace) {
            return Err(AddressError::Malformed(address.to_string(), "contains whitespace".into()));
        }

        let dial_target = if address.contains("://") {
            parse_url_target(address)?
        } else {
            parse_host_port(address)?
        };

        Ok(Self {
            address: address.to_string(),
            dial_target,
            health: HealthState::Unknown,
            last_error: None,
            last_attempt: None,
            unhealthy_since: None,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn dial_target(&self) -> &str {
        &self.dial_target
    }

    pub fn health(&self) -> HealthState {
        self.health
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    /// Start of the current unhealthy streak.
    pub fn unhealthy_since(&self) -> Option<Instant> {
        self.unhealthy_since
    }

    /// Record a successful dial.
    pub fn mark_healthy(&mut self) {
        self.health = HealthState::Healthy;
        self.last_error = None;
        self.unhealthy_since = None;
        self.last_attempt = Some(Instant::now());
    }

    /// Record a failure. `unhealthy_since` keeps the first failure time.
    pub fn mark_unhealthy(&mut self, error: impl Into<String>) {
        let now = Instant::now();
        if self.health != HealthState::Unhealthy {
            self.unhealthy_since = Some(now);
        }
        self.health = HealthState::Unhealthy;
        self.last_error = Some(error.into());
        self.last_attempt = Some(now);
    }

    /// True if unhealthy and the latest failure is younger than `cooldown`.
    pub fn is_cooling_down(&self, now: Instant, cooldown: Duration) -> bool {
        match (self.health, self.last_attempt) {
            (HealthState::Unhealthy, Some(failed)) => now.saturating_duration_since(failed) < cooldown,
            _ => false,
        }
    }
}

fn parse_url_target(address: &str) -> Result<String, AddressError> {
    let url = Url::parse(address)
        .map_err(|e| AddressError::Malformed(address.to_string(), e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(AddressError::UnsupportedScheme(address.to_string(), other.to_string()));
        }
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(AddressError::Malformed(address.to_string(), "unexpected path".into()));
    }

    let host = url
        .host_str()
        .ok_or_else(|| AddressError::Malformed(address.to_string(), "missing host".into()))?;
    // Explicit port required; the scheme default is not a member port.
    let port = url
        .port()
        .ok_or_else(|| AddressError::Malformed(address.to_string(), "missing port".into()))?;

    Ok(format!("{}:{}", host, port))
}

fn parse_host_port(address: &str) -> Result<String, AddressError> {
    let malformed = |reason: &str| AddressError::Malformed(address.to_string(), reason.to_string());

    let (host, port) = address.rsplit_once(':').ok_or_else(|| malformed("missing port"))?;
    if host.is_empty() {
        return Err(malformed("missing host"));
    }
    // Bare IPv6 must be bracketed, otherwise the port split is ambiguous.
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        return Err(malformed("IPv6 host must be bracketed"));
    }
    port.parse::<u16>().map_err(|_| malformed("invalid port"))?;

    Ok(address.to_string())
}
