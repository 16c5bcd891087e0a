//! Request orchestration
//!
//! `CacheMiddleware` ties the components together, per request:
//! derive the key, check the candidate predicate, look the key up, then
//! either replay (full body or a revalidated 304) or let the request proceed
//! while capturing the outgoing bytes for next time.
//!
//! Every cache-path failure degrades to "serve without cache". A store that
//! is down, a capture that cannot be parsed, a client that disconnects
//! mid-stream: none of them can turn a working handler into a failing
//! request.

use crate::body::{CacheBody, Next, Request, Response};
use crate::capture::{CaptureBody, CaptureOutcome, Finalizer};
use crate::config::{CacheOptions, CacheOptionsBuilder, Ttl};
use crate::entry::CachedResponse;
use crate::error::{ConfigError, StoreError};
use crate::expiry::ExpiryPolicy;
use crate::key::KeySeed;
use crate::locks::LockTable;
use crate::parse::parse_response;
use crate::revalidate::not_modified;
use crate::store::{CacheStore, MemoryStore};
use http::header::{HeaderName, HeaderValue, ETAG, IF_NONE_MATCH};
use http::{Method, StatusCode};
use std::sync::{Arc, Once};
use tracing::{debug, warn};

static MEMORY_STORE_WARNING: Once = Once::new();

/// HTTP response cache middleware.
///
/// Sits in front of the request pipeline: serves stored responses while they
/// are fresh, and transparently captures handler output on a miss. Handlers
/// never know the cache exists.
///
/// Instances are cheap to clone and to derive: the `with_*` methods return a
/// new middleware sharing the same store and capture-lock table, leaving the
/// original untouched.
///
/// # Example
///
/// ```rust,ignore
/// use expedite::{CacheMiddleware, CacheOptions};
///
/// let cache = CacheMiddleware::new(
///     CacheOptions::builder()
///         .namespace("users")
///         .default_ttl("1 minute")
///         .build()?,
/// );
/// let slow_cache = cache.with_ttl("1 hour")?;
/// ```
#[derive(Clone)]
pub struct CacheMiddleware {
    options: Arc<CacheOptions>,
    expiry: ExpiryPolicy,
    store: Arc<dyn CacheStore>,
    locks: Arc<LockTable>,
}

impl CacheMiddleware {
    /// Create a middleware backed by the default in-memory store.
    pub fn new(options: CacheOptions) -> Self {
        MEMORY_STORE_WARNING.call_once(|| {
            warn!(
                "no cache store supplied; defaulting to the in-memory store. \
                 Unbounded cached responses can exhaust process memory"
            );
        });
        Self::with_store(options, Arc::new(MemoryStore::new()))
    }

    /// Create a middleware backed by the given store engine.
    pub fn with_store(options: CacheOptions, store: Arc<dyn CacheStore>) -> Self {
        let expiry = ExpiryPolicy::new(options.default_ttl, options.status_code_expires.clone());
        Self {
            options: Arc::new(options),
            expiry,
            store,
            locks: Arc::new(LockTable::new()),
        }
    }

    /// Handle to the underlying store, for programmatic cache access.
    pub fn store(&self) -> Arc<dyn CacheStore> {
        self.store.clone()
    }

    /// The configuration this instance runs with.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Remove all entries in `namespace`, or every entry when `None`.
    pub async fn flush(&self, namespace: Option<&str>) -> Result<(), StoreError> {
        self.store.flush(namespace).await
    }

    /// Derive a new instance with overrides applied on top of the current
    /// configuration. The new instance shares this one's store and lock
    /// table; the current instance is never mutated.
    pub fn with_config_overrides(
        &self,
        overrides: impl FnOnce(CacheOptionsBuilder) -> CacheOptionsBuilder,
    ) -> Result<Self, ConfigError> {
        let options = overrides(self.options.to_builder()).build()?;
        Ok(self.derive(options))
    }

    /// Derive a new instance with a different default TTL.
    pub fn with_ttl(&self, ttl: impl Into<Ttl>) -> Result<Self, ConfigError> {
        let ttl = ttl.into();
        self.with_config_overrides(|builder| builder.default_ttl(ttl))
    }

    /// Derive a new instance overriding the TTL for one status code.
    pub fn with_ttl_for_status(
        &self,
        status: u16,
        ttl: impl Into<Ttl>,
    ) -> Result<Self, ConfigError> {
        let ttl = ttl.into();
        self.with_config_overrides(|builder| builder.expire_status(status, ttl))
    }

    /// Derive a new instance storing entries under a different namespace.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Result<Self, ConfigError> {
        let namespace = namespace.into();
        self.with_config_overrides(|builder| builder.namespace(namespace))
    }

    /// Derive a new instance with a different cache candidate predicate.
    pub fn with_condition<F>(&self, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        let mut options = (*self.options).clone();
        options.should_cache = Some(Arc::new(predicate));
        self.derive(options)
    }

    /// Derive a new instance with a custom cache key generator.
    pub fn with_cache_key<F>(&self, generator: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        let mut options = (*self.options).clone();
        options.key_generator = Some(Arc::new(generator));
        self.derive(options)
    }

    /// Derive a new instance with session awareness switched on or off.
    pub fn with_session_awareness(&self, aware: bool) -> Self {
        let mut options = (*self.options).clone();
        options.session_aware = aware;
        self.derive(options)
    }

    fn derive(&self, options: CacheOptions) -> Self {
        let expiry = ExpiryPolicy::new(options.default_ttl, options.status_code_expires.clone());
        Self {
            options: Arc::new(options),
            expiry,
            store: self.store.clone(),
            locks: self.locks.clone(),
        }
    }

    /// Process one request.
    ///
    /// `next` runs the rest of the pipeline and is invoked exactly once
    /// unless the response is served entirely from cache.
    pub async fn handle(&self, req: Request, next: Next) -> Response {
        let seed = KeySeed::from_request(
            &req,
            self.options.session_aware,
            self.options.key_generator.as_ref(),
        );
        let key = seed.request_key();

        let candidate = match &self.options.should_cache {
            Some(predicate) => predicate(&req),
            None => req.method() == Method::GET,
        };
        if !candidate {
            debug!(key = %key, "request is not a cache candidate, skipping lookup");
            return next(req).await;
        }

        debug!(key = %key, "checking cache");
        match self.store.get(&self.namespaced(&key)).await {
            Ok(Some(entry)) => self.replay(entry, &req),
            Ok(None) => {
                debug!(key = %key, "cache miss, proceeding with request");
                self.capture_or_passthrough(seed, key, req, next).await
            }
            Err(err) => {
                warn!(key = %key, error = %err, "cache read failed, serving without cache");
                self.capture_or_passthrough(seed, key, req, next).await
            }
        }
    }

    /// HIT: answer from the stored entry, as a 304 when the client's
    /// validator still matches, otherwise as a full replay.
    fn replay(&self, mut entry: CachedResponse, req: &Request) -> Response {
        let incoming = req
            .headers()
            .get(IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok());
        let validator = entry.header("etag").map(str::to_owned);

        if not_modified(incoming, validator.as_deref()) {
            debug!("cache hit and validator matches, responding 304");
            let mut builder = http::Response::builder().status(StatusCode::NOT_MODIFIED);
            if let Some(etag) = validator.as_deref() {
                builder = builder.header(ETAG, etag);
            }
            if let Some(name) = &self.options.status_header {
                builder = builder.header(name, "hit");
            }
            return builder.body(CacheBody::empty()).unwrap();
        }

        debug!("cache hit, replaying stored response");
        if let Some(name) = &self.options.status_header {
            entry.set_header(name.as_str(), "hit");
        }
        // The stored body is already reassembled; chunk framing does not
        // apply to the replay.
        entry.remove_header("transfer-encoding");
        if entry.header("date").is_some() {
            entry.set_header("date", imf_fixdate_now());
        }

        let mut builder = http::Response::builder().status(entry.status);
        for (name, value) in &entry.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }
        builder.body(CacheBody::full(entry.body)).unwrap()
    }

    /// MISS: become the capturing owner if nobody else is, otherwise stream
    /// straight through without touching memory or the store.
    async fn capture_or_passthrough(
        &self,
        seed: KeySeed,
        key: String,
        req: Request,
        next: Next,
    ) -> Response {
        if !self.locks.try_acquire(&key) {
            debug!(key = %key, "another request is capturing this key, passing through");
            return next(req).await;
        }

        debug!(key = %key, "this request will build the cache entry");
        let mut response = next(req).await;
        if let Some(name) = &self.options.status_header {
            response
                .headers_mut()
                .insert(name.clone(), HeaderValue::from_static("miss"));
        }
        CaptureBody::attach(response, self.finalizer(seed, key))
    }

    /// FINALIZING: runs exactly once when the captured stream terminates.
    /// The lock is released on every path.
    fn finalizer(&self, seed: KeySeed, key: String) -> Finalizer {
        let store = self.store.clone();
        let locks = self.locks.clone();
        let expiry = self.expiry.clone();
        let namespace = self.options.namespace.clone();

        Box::new(move |outcome| {
            let raw = match outcome {
                CaptureOutcome::Complete(raw) => raw,
                CaptureOutcome::Aborted => {
                    debug!(key = %key, "capture aborted, releasing lock without storing");
                    locks.release(&key);
                    return;
                }
            };

            let entry = match parse_response(&raw) {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(key = %key, error = %err, "captured response did not parse, discarding");
                    locks.release(&key);
                    return;
                }
            };

            let ttl = expiry.resolve(entry.status);
            if ttl.is_zero() {
                debug!(key = %key, status = entry.status, "cache time for this status is zero, not storing");
                locks.release(&key);
                return;
            }

            // The entry is stored under a key that folds in the validator
            // the handler actually produced, so clients carrying that
            // validator hit it directly next time. This gives one resource
            // a 200 entry and a 304 entry side by side.
            let write_key = seed.write_key(entry.header("etag"));
            let write_key = format!("{namespace}:{write_key}");

            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        let result = store.set(&write_key, entry, ttl).await;
                        locks.release(&key);
                        match result {
                            Ok(()) => debug!(key = %write_key, "wrote captured response to cache"),
                            Err(err) => {
                                warn!(key = %write_key, error = %err, "failed to write capture to cache")
                            }
                        }
                    });
                }
                Err(_) => {
                    // The body finished on a thread with no async runtime;
                    // the write cannot run, but the lock must not leak.
                    warn!(key = %write_key, "no async runtime at finalize, skipping cache write");
                    locks.release(&key);
                }
            }
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.options.namespace, key)
    }
}

/// Current time as an IMF-fixdate, for refreshing the `date` header on
/// replayed responses.
fn imf_fixdate_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CacheOptions {
        CacheOptions::builder()
            .namespace("test")
            .default_ttl("1m")
            .build()
            .unwrap()
    }

    #[test]
    fn derived_instances_share_store_and_locks() {
        let mw = CacheMiddleware::with_store(options(), Arc::new(MemoryStore::new()));
        let derived = mw.with_ttl("5m").unwrap();

        assert!(Arc::ptr_eq(&mw.store, &derived.store));
        assert!(Arc::ptr_eq(&mw.locks, &derived.locks));
        assert_eq!(derived.options().default_ttl(), std::time::Duration::from_secs(300));
        // Original untouched.
        assert_eq!(mw.options().default_ttl(), std::time::Duration::from_secs(60));
    }

    #[test]
    fn independent_roots_get_independent_lock_tables() {
        let a = CacheMiddleware::with_store(options(), Arc::new(MemoryStore::new()));
        let b = CacheMiddleware::with_store(options(), Arc::new(MemoryStore::new()));
        assert!(!Arc::ptr_eq(&a.locks, &b.locks));
    }

    #[test]
    fn with_namespace_rejects_an_empty_override() {
        let mw = CacheMiddleware::with_store(options(), Arc::new(MemoryStore::new()));
        assert!(mw.with_namespace("").is_err());
        assert!(mw.with_namespace("reports").is_ok());
    }

    #[test]
    fn with_ttl_rejects_unparseable_text() {
        let mw = CacheMiddleware::with_store(options(), Arc::new(MemoryStore::new()));
        assert!(mw.with_ttl("eventually").is_err());
    }

    #[test]
    fn fixdate_looks_like_an_http_date() {
        let date = imf_fixdate_now();
        assert!(date.ends_with(" GMT"));
        assert_eq!(date.matches(':').count(), 2);
    }
}
