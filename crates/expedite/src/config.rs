//! Middleware configuration
//!
//! Options are validated once, when an instance is built. Nothing in this
//! module runs on a request path: TTL strings are parsed here, the
//! cache-status header name is checked here, and a malformed configuration
//! fails construction with a [`ConfigError`] rather than ever failing a
//! request.
//!
//! A built [`CacheOptions`] is immutable. The middleware's `with_*` methods
//! derive new option sets instead of mutating.

use crate::body::Request;
use crate::error::ConfigError;
use crate::key::KeyGenerator;
use http::header::HeaderName;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default name for the cache-status indicator header.
pub const DEFAULT_CACHE_STATUS_HEADER: &str = "x-expedite-cache";

/// Predicate deciding whether a request is a cache candidate.
pub type CachePredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// A TTL that may be given as a duration, raw milliseconds, or a
/// human-readable string such as `"1 minute"`.
///
/// String forms are parsed at configuration time; a string that cannot be
/// parsed, or that parses to zero, fails construction.
#[derive(Debug, Clone)]
pub enum Ttl {
    /// An explicit duration.
    Duration(Duration),
    /// Raw milliseconds.
    Millis(u64),
    /// Human-readable text, e.g. `"90s"` or `"1 minute"`.
    Text(String),
}

impl Ttl {
    pub(crate) fn resolve(&self) -> Result<Duration, ConfigError> {
        match self {
            Ttl::Duration(d) => Ok(*d),
            Ttl::Millis(ms) => Ok(Duration::from_millis(*ms)),
            Ttl::Text(text) => {
                // humantime separates terms with spaces but not digits from
                // units, so "1 minute" needs its whitespace removed.
                let compact: String = text.split_whitespace().collect();
                let parsed = humantime::parse_duration(&compact).map_err(|e| {
                    ConfigError::InvalidTtl {
                        input: text.clone(),
                        reason: e.to_string(),
                    }
                })?;
                if parsed.is_zero() {
                    return Err(ConfigError::ZeroTtl {
                        input: text.clone(),
                    });
                }
                Ok(parsed)
            }
        }
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        Ttl::Duration(d)
    }
}

impl From<u64> for Ttl {
    fn from(ms: u64) -> Self {
        Ttl::Millis(ms)
    }
}

impl From<&str> for Ttl {
    fn from(text: &str) -> Self {
        Ttl::Text(text.to_string())
    }
}

impl From<String> for Ttl {
    fn from(text: String) -> Self {
        Ttl::Text(text)
    }
}

#[derive(Clone)]
enum StatusHeaderSetting {
    Default,
    Named(String),
    Disabled,
}

/// Validated, immutable configuration for one middleware instance.
#[derive(Clone)]
pub struct CacheOptions {
    pub(crate) namespace: String,
    pub(crate) default_ttl: Duration,
    pub(crate) status_code_expires: HashMap<u16, Duration>,
    pub(crate) session_aware: bool,
    /// `None` when the indicator header is disabled.
    pub(crate) status_header: Option<HeaderName>,
    pub(crate) should_cache: Option<CachePredicate>,
    pub(crate) key_generator: Option<KeyGenerator>,
}

impl CacheOptions {
    /// Start building an option set.
    pub fn builder() -> CacheOptionsBuilder {
        CacheOptionsBuilder::new()
    }

    /// The namespace entries are stored under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The TTL applied to 200/304 entries without an explicit override.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Whether cache keys include the session id.
    pub fn session_aware(&self) -> bool {
        self.session_aware
    }

    /// Rebuild a builder seeded with this option set.
    ///
    /// Used by the derive-style `with_*` methods; overrides are applied on
    /// top and re-validated.
    pub fn to_builder(&self) -> CacheOptionsBuilder {
        CacheOptionsBuilder {
            namespace: Some(self.namespace.clone()),
            default_ttl: Some(Ttl::Duration(self.default_ttl)),
            status_code_expires: self
                .status_code_expires
                .iter()
                .map(|(status, ttl)| (*status, Ttl::Duration(*ttl)))
                .collect(),
            session_aware: self.session_aware,
            status_header: match &self.status_header {
                Some(name) => StatusHeaderSetting::Named(name.as_str().to_string()),
                None => StatusHeaderSetting::Disabled,
            },
            should_cache: self.should_cache.clone(),
            key_generator: self.key_generator.clone(),
        }
    }
}

impl std::fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOptions")
            .field("namespace", &self.namespace)
            .field("default_ttl", &self.default_ttl)
            .field("status_code_expires", &self.status_code_expires)
            .field("session_aware", &self.session_aware)
            .field("status_header", &self.status_header)
            .field("should_cache", &self.should_cache.is_some())
            .field("key_generator", &self.key_generator.is_some())
            .finish()
    }
}

/// Builder for [`CacheOptions`].
#[derive(Clone)]
pub struct CacheOptionsBuilder {
    namespace: Option<String>,
    default_ttl: Option<Ttl>,
    status_code_expires: HashMap<u16, Ttl>,
    session_aware: bool,
    status_header: StatusHeaderSetting,
    should_cache: Option<CachePredicate>,
    key_generator: Option<KeyGenerator>,
}

impl CacheOptionsBuilder {
    fn new() -> Self {
        Self {
            namespace: None,
            default_ttl: None,
            status_code_expires: HashMap::new(),
            // Off unless requested: session-blind keys must be opted into
            // deliberately since they can leak per-user responses.
            session_aware: false,
            status_header: StatusHeaderSetting::Default,
            should_cache: None,
            key_generator: None,
        }
    }

    /// Namespace for stored entries. Required, non-empty.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Default TTL for 200/304 entries. Required.
    pub fn default_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.default_ttl = Some(ttl.into());
        self
    }

    /// Override the TTL for one status code.
    ///
    /// Statuses outside 200/304 are only cached at all when listed here.
    pub fn expire_status(mut self, status: u16, ttl: impl Into<Ttl>) -> Self {
        self.status_code_expires.insert(status, ttl.into());
        self
    }

    /// Include the session id in derived cache keys.
    pub fn session_aware(mut self, aware: bool) -> Self {
        self.session_aware = aware;
        self
    }

    /// Rename the cache-status indicator header.
    pub fn cache_status_header(mut self, name: impl Into<String>) -> Self {
        self.status_header = StatusHeaderSetting::Named(name.into());
        self
    }

    /// Do not emit a cache-status indicator header at all.
    pub fn disable_cache_status_header(mut self) -> Self {
        self.status_header = StatusHeaderSetting::Disabled;
        self
    }

    /// Replace the default GET-only cache candidate check.
    pub fn should_cache<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.should_cache = Some(Arc::new(predicate));
        self
    }

    /// Supply a custom cache key generator; its output is used verbatim.
    pub fn key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.key_generator = Some(Arc::new(generator));
        self
    }

    /// Validate and freeze the options.
    pub fn build(self) -> Result<CacheOptions, ConfigError> {
        let namespace = match self.namespace {
            Some(ns) if !ns.trim().is_empty() => ns,
            _ => return Err(ConfigError::InvalidNamespace),
        };
        let default_ttl = self
            .default_ttl
            .ok_or(ConfigError::MissingDefaultTtl)?
            .resolve()?;

        let mut status_code_expires = HashMap::with_capacity(self.status_code_expires.len());
        for (status, ttl) in self.status_code_expires {
            status_code_expires.insert(status, ttl.resolve()?);
        }

        let status_header = match self.status_header {
            StatusHeaderSetting::Default => {
                Some(HeaderName::from_static(DEFAULT_CACHE_STATUS_HEADER))
            }
            StatusHeaderSetting::Named(name) => Some(
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| ConfigError::InvalidHeaderName { name })?,
            ),
            StatusHeaderSetting::Disabled => None,
        };

        Ok(CacheOptions {
            namespace,
            default_ttl,
            status_code_expires,
            session_aware: self.session_aware,
            status_header,
            should_cache: self.should_cache,
            key_generator: self.key_generator,
        })
    }
}
