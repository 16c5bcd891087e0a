//! Per-status-code expiry policy
//!
//! Maps a final response status to the TTL its cache entry should get. A
//! zero duration is the sentinel for "skip the store write entirely", not
//! "expire immediately".

use std::collections::HashMap;
use std::time::Duration;

/// Resolves a response status code to a time-to-live.
///
/// 200 and 304 fall back to the default TTL when no explicit override is
/// configured; every other status defaults to zero (do not persist) unless
/// overridden. A 304 is cached because it represents a valid response in its
/// own right.
#[derive(Debug, Clone)]
pub struct ExpiryPolicy {
    default_ttl: Duration,
    overrides: HashMap<u16, Duration>,
}

impl ExpiryPolicy {
    /// Build a policy from the default TTL and per-status overrides.
    pub fn new(default_ttl: Duration, overrides: HashMap<u16, Duration>) -> Self {
        Self {
            default_ttl,
            overrides,
        }
    }

    /// TTL for an entry with the given final status code.
    pub fn resolve(&self, status: u16) -> Duration {
        if let Some(ttl) = self.overrides.get(&status) {
            return *ttl;
        }
        if status == 200 || status == 304 {
            self.default_ttl
        } else {
            Duration::ZERO
        }
    }
}
