//! Cluster protocol version.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Oldest cluster version this client agrees to talk to when the
/// old-cluster gate is enabled.
pub const MIN_CLUSTER_VERSION: ClusterVersion = ClusterVersion { major: 3, minor: 2 };

/// Major/minor protocol version reported by a member.
///
/// Patch levels are accepted when parsing and ignored for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterVersion {
    pub major: u32,
    pub minor: u32,
}

impl ClusterVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// True if this version is at least [`MIN_CLUSTER_VERSION`].
    pub fn is_supported(&self) -> bool {
        *self >= MIN_CLUSTER_VERSION
    }
}

impl fmt::Display for ClusterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Error parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cluster version '{0}'")]
pub struct ParseVersionError(String);

impl FromStr for ClusterVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u32, ParseVersionError> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| ParseVersionError(s.to_string()))
        };
        let major = next()?;
        let minor = next()?;
        // Optional patch component, validated but unused.
        if let Some(patch) = parts.next() {
            patch
                .parse::<u32>()
                .map_err(|_| ParseVersionError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseVersionError(s.to_string()));
        }
        Ok(Self { major, minor })
    }
}

impl Serialize for ClusterVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClusterVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
