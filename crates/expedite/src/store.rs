//! Cache store seam and the default in-memory engine
//!
//! The middleware treats storage as an external key/value store with TTL.
//! Keys arrive already namespaced as `namespace:key`, so engines can flush a
//! namespace by prefix without understanding key structure. Engines provide
//! their own concurrency guarantees; the middleware only requires atomic
//! `get`/`set`/`flush` per key.

use crate::entry::CachedResponse;
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Abstract cache storage with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Fetch the entry under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError>;

    /// Write `value` under `key`, valid for `ttl`.
    ///
    /// Never called with a zero `ttl`; the middleware skips the write
    /// entirely in that case.
    async fn set(&self, key: &str, value: CachedResponse, ttl: Duration) -> Result<(), StoreError>;

    /// Remove every entry in `namespace`, or all entries when `None`.
    async fn flush(&self, namespace: Option<&str>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: CachedResponse,
    expires_at: Instant,
}

/// In-memory engine used when no other store is supplied.
///
/// Expired entries are dropped lazily on access, so memory for a key is
/// reclaimed the next time it is looked up. Suitable for a single process;
/// anything needing shared or bounded storage should bring its own
/// [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired, not yet reaped) entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: CachedResponse, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn flush(&self, namespace: Option<&str>) -> Result<(), StoreError> {
        match namespace {
            Some(ns) => {
                let prefix = format!("{ns}:");
                self.entries.retain(|key, _| !key.starts_with(&prefix));
            }
            None => self.entries.clear(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn entry(body: &str) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "text/plain".into())],
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryStore::new();
        store
            .set("ns:GET-/x", entry("ok"), Duration::from_secs(60))
            .await
            .unwrap();
        let got = store.get("ns:GET-/x").await.unwrap().unwrap();
        assert_eq!(got, entry("ok"));
    }

    #[tokio::test]
    async fn missing_key_is_a_clean_miss() {
        let store = MemoryStore::new();
        assert!(store.get("ns:nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_reaped_on_access() {
        let store = MemoryStore::new();
        store
            .set("ns:GET-/x", entry("ok"), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("ns:GET-/x").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn flush_by_namespace_only_touches_that_prefix() {
        let store = MemoryStore::new();
        store
            .set("a:GET-/x", entry("a"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("b:GET-/x", entry("b"), Duration::from_secs(60))
            .await
            .unwrap();

        store.flush(Some("a")).await.unwrap();
        assert!(store.get("a:GET-/x").await.unwrap().is_none());
        assert!(store.get("b:GET-/x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn flush_without_namespace_clears_everything() {
        let store = MemoryStore::new();
        store
            .set("a:GET-/x", entry("a"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("b:GET-/x", entry("b"), Duration::from_secs(60))
            .await
            .unwrap();

        store.flush(None).await.unwrap();
        assert!(store.is_empty());
    }
}
