//! # expedite
//!
//! HTTP response cache middleware. It sits in front of a request pipeline,
//! replays a previously captured response while it is fresh, and otherwise
//! lets the request proceed while transparently capturing the outgoing bytes
//! for future reuse. Handlers never know caching exists.
//!
//! What it does per request:
//!
//! - derives a cache key from method, path+query, optionally the session id,
//!   optionally an ETag validator;
//! - looks the key up in a pluggable [`CacheStore`] (TTL key/value, with an
//!   in-memory default);
//! - on a hit, replays the stored status/headers/body, or answers a bare 304
//!   when the client's `if-none-match` still matches;
//! - on a miss, takes a per-key capture lock (one concurrent capture per
//!   key), mirrors the streamed response bytes into a buffer, and once the
//!   stream completes parses them back into a structured entry and stores it
//!   with a per-status TTL.
//!
//! It is not a general HTTP cache: no cache-control parsing, no vary
//! negotiation, no cross-process locking.
//!
//! ## Example
//!
//! ```rust,ignore
//! use expedite::{CacheMiddleware, CacheOptions};
//!
//! let cache = CacheMiddleware::new(
//!     CacheOptions::builder()
//!         .namespace("pages")
//!         .default_ttl("1 minute")
//!         .expire_status(404, "10 seconds")
//!         .build()?,
//! );
//!
//! // Installed in front of the pipeline:
//! // let response = cache.handle(request, next).await;
//! ```
//!
//! Derived instances share the same store and capture locks:
//!
//! ```rust,ignore
//! let slow = cache.with_ttl("1 hour")?;
//! let per_user = cache.with_session_awareness(true);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod body;
mod capture;
mod config;
mod entry;
mod error;
mod expiry;
mod key;
mod locks;
mod middleware;
mod parse;
mod revalidate;
mod store;

pub use body::{CacheBody, Next, Request, Response};
pub use config::{
    CacheOptions, CacheOptionsBuilder, CachePredicate, Ttl, DEFAULT_CACHE_STATUS_HEADER,
};
pub use entry::CachedResponse;
pub use error::{BoxError, ConfigError, ParseError, StoreError};
pub use expiry::ExpiryPolicy;
pub use key::{KeyGenerator, SessionId};
pub use locks::LockTable;
pub use middleware::CacheMiddleware;
pub use parse::parse_response;
pub use revalidate::not_modified;
pub use store::{CacheStore, MemoryStore};
