//! Structured form of a captured HTTP response
//!
//! This is the value stored under a cache key: status, header list, body.
//! Header names keep the casing they were captured with so replays look like
//! the original response, but lookups are case-insensitive.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A captured response ready for storage and replay.
///
/// Serializable so out-of-process store engines can persist entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Headers in capture order, original casing preserved.
    pub headers: Vec<(String, String)>,
    /// Reassembled body bytes (chunked transfer framing already removed).
    pub body: Bytes,
}

impl CachedResponse {
    /// Look up a header value, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace a header value in place, or append it if absent.
    ///
    /// Matches case-insensitively but keeps the existing stored casing when
    /// replacing.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    /// Drop every header with the given name, matching case-insensitively.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![
                ("Content-Type".into(), "text/plain".into()),
                ("ETag".into(), "W/\"abc\"".into()),
            ],
            body: Bytes::from("ok"),
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let entry = entry();
        assert_eq!(entry.header("etag"), Some("W/\"abc\""));
        assert_eq!(entry.header("ETAG"), Some("W/\"abc\""));
        assert_eq!(entry.header("x-missing"), None);
    }

    #[test]
    fn set_header_replaces_without_changing_stored_casing() {
        let mut entry = entry();
        entry.set_header("content-type", "application/json");
        assert_eq!(entry.header("Content-Type"), Some("application/json"));
        assert!(entry.headers.iter().any(|(n, _)| n == "Content-Type"));
    }

    #[test]
    fn set_header_appends_when_absent() {
        let mut entry = entry();
        entry.set_header("x-cache", "hit");
        assert_eq!(entry.header("X-Cache"), Some("hit"));
    }

    #[test]
    fn remove_header_drops_all_spellings() {
        let mut entry = entry();
        entry.headers.push(("etag".into(), "dup".into()));
        entry.remove_header("ETag");
        assert_eq!(entry.header("etag"), None);
    }
}
