//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Endpoint list: non-empty, unique, well-formed
//! - Value ranges (retry attempts, backoff bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Endpoint rules are the same ones `EndpointSet` enforces at runtime

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::ClientConfig;
use crate::endpoint::Endpoint;

/// One problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NoEndpoints,
    DuplicateEndpoint(String),
    MalformedEndpoint { address: String, reason: String },
    ZeroRetryAttempts,
    BackoffBoundsInverted { base_ms: u64, max_ms: u64 },
    InvalidMetricsAddress(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoEndpoints => write!(f, "at least one endpoint is required"),
            ValidationError::DuplicateEndpoint(addr) => write!(f, "duplicate endpoint '{}'", addr),
            ValidationError::MalformedEndpoint { address, reason } => {
                write!(f, "malformed endpoint '{}': {}", address, reason)
            }
            ValidationError::ZeroRetryAttempts => {
                write!(f, "retries.max_attempts must be at least 1")
            }
            ValidationError::BackoffBoundsInverted { base_ms, max_ms } => write!(
                f,
                "retries.base_delay_ms ({}) exceeds retries.max_delay_ms ({})",
                base_ms, max_ms
            ),
            ValidationError::InvalidMetricsAddress(addr) => {
                write!(f, "observability.metrics_address '{}' is not a socket address", addr)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check `config`, collecting every problem.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = validate_endpoints(&config.endpoints);

    if config.retries.enabled {
        if config.retries.max_attempts == 0 {
            errors.push(ValidationError::ZeroRetryAttempts);
        }
        if config.retries.base_delay_ms > config.retries.max_delay_ms {
            errors.push(ValidationError::BackoffBoundsInverted {
                base_ms: config.retries.base_delay_ms,
                max_ms: config.retries.max_delay_ms,
            });
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Endpoint-list rules alone.
pub fn validate_endpoints<S: AsRef<str>>(endpoints: &[S]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints);
        return errors;
    }

    let mut seen = HashSet::new();
    for raw in endpoints {
        match Endpoint::parse(raw.as_ref()) {
            Ok(endpoint) => {
                if !seen.insert(endpoint.dial_target().to_string()) {
                    errors.push(ValidationError::DuplicateEndpoint(endpoint.address().to_string()));
                }
            }
            Err(e) => errors.push(ValidationError::MalformedEndpoint {
                address: raw.as_ref().to_string(),
                reason: e.to_string(),
            }),
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = ClientConfig::with_endpoints(["a:2379", "http://b:2379"]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ClientConfig::with_endpoints(["a:2379", "a:2379", "nope"]);
        config.retries.max_attempts = 0;
        config.retries.base_delay_ms = 5000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::DuplicateEndpoint("a:2379".into())));
        assert!(errors.contains(&ValidationError::ZeroRetryAttempts));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::MalformedEndpoint { address, .. } if address == "nope")));
    }

    #[test]
    fn test_empty_endpoints() {
        let config = ClientConfig::default();
        assert_eq!(validate_config(&config).unwrap_err(), vec![ValidationError::NoEndpoints]);
    }

    #[test]
    fn test_scheme_and_plain_spelling_are_duplicates() {
        let errors = validate_endpoints(&["http://a:2379", "a:2379"]);
        assert_eq!(errors, vec![ValidationError::DuplicateEndpoint("a:2379".into())]);
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = ClientConfig::with_endpoints(["a:1"]);
        config.observability.metrics_address = "not-an-addr".into();
        assert!(validate_config(&config).is_ok());
        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
