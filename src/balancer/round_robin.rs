//! Round-robin candidate ordering.

use std::time::{Duration, Instant};

use crate::endpoint::EndpointSet;

/// Order in which a dial cycle tries endpoints.
///
/// Rotation starts just after `last_used` (wrapping), or at index 0 when
/// there is none or it was removed. Endpoints still cooling down after a
/// failure are skipped; if every endpoint is cooling down the whole list is
/// returned from index 0 so a cycle always has something to try.
pub fn candidate_order(
    endpoints: &EndpointSet,
    last_used: Option<&str>,
    now: Instant,
    cooldown: Duration,
) -> Vec<String> {
    let all = endpoints.as_slice();
    if all.is_empty() {
        return Vec::new();
    }

    let len = all.len();
    let start = last_used
        .and_then(|addr| endpoints.position(addr))
        .map(|pos| (pos + 1) % len)
        .unwrap_or(0);

    let rotated: Vec<String> = (0..len)
        .map(|i| &all[(start + i) % len])
        .filter(|endpoint| !endpoint.is_cooling_down(now, cooldown))
        .map(|endpoint| endpoint.address().to_string())
        .collect();

    if rotated.is_empty() {
        return endpoints.addresses();
    }
    rotated
}
