//! The ordered, mutable collection of known endpoints.
//!
//! # Responsibilities
//! - Validate address lists (non-empty, unique, well-formed)
//! - Swap contents wholesale on reconfiguration, reporting the diff
//! - Record per-endpoint health, tolerating updates for removed endpoints

use std::collections::HashSet;

use crate::endpoint::state::Endpoint;
use crate::error::ClientError;

/// What changed in a [`EndpointSet::replace`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl EndpointDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn removes(&self, address: &str) -> bool {
        self.removed.iter().any(|a| a == address)
    }
}

/// Ordered endpoints with unique addresses. Never empty.
#[derive(Debug, Clone)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    /// Build a set with every endpoint in state `Unknown`.
    pub fn new<S: AsRef<str>>(addresses: &[S]) -> Result<Self, ClientError> {
        Ok(Self {
            endpoints: parse_all(addresses)?,
        })
    }

    /// Replace the contents. On error the set is left untouched.
    ///
    /// Endpoints present before and after keep their health bookkeeping.
    pub fn replace<S: AsRef<str>>(&mut self, addresses: &[S]) -> Result<EndpointDiff, ClientError> {
        let mut next = parse_all(addresses)?;

        let mut diff = EndpointDiff::default();
        for endpoint in next.iter_mut() {
            match self.get(endpoint.address()) {
                Some(existing) => *endpoint = existing.clone(),
                None => diff.added.push(endpoint.address().to_string()),
            }
        }
        for old in &self.endpoints {
            if !next.iter().any(|e| e.address() == old.address()) {
                diff.removed.push(old.address().to_string());
            }
        }

        self.endpoints = next;
        Ok(diff)
    }

    /// No-op if `address` is no longer in the set.
    pub fn mark_healthy(&mut self, address: &str) -> bool {
        match self.get_mut(address) {
            Some(endpoint) => {
                endpoint.mark_healthy();
                true
            }
            None => false,
        }
    }

    /// No-op if `address` is no longer in the set.
    pub fn mark_unhealthy(&mut self, address: &str, error: impl Into<String>) -> bool {
        match self.get_mut(address) {
            Some(endpoint) => {
                endpoint.mark_unhealthy(error);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, address: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.address() == address)
    }

    fn get_mut(&mut self, address: &str) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.address() == address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.get(address).is_some()
    }

    pub fn position(&self, address: &str) -> Option<usize> {
        self.endpoints.iter().position(|e| e.address() == address)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.address().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn as_slice(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn parse_all<S: AsRef<str>>(addresses: &[S]) -> Result<Vec<Endpoint>, ClientError> {
    if addresses.is_empty() {
        return Err(ClientError::InvalidConfiguration(
            "endpoint list is empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut endpoints = Vec::with_capacity(addresses.len());
    for raw in addresses {
        let endpoint = Endpoint::parse(raw.as_ref())
            .map_err(|e| ClientError::InvalidConfiguration(e.to_string()))?;
        // Two spellings of the same member count as a duplicate.
        if !seen.insert(endpoint.dial_target().to_string()) {
            return Err(ClientError::InvalidConfiguration(format!(
                "duplicate endpoint '{}'",
                endpoint.address()
            )));
        }
        endpoints.push(endpoint);
    }
    Ok(endpoints)
}
