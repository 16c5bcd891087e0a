//! Cache key derivation
//!
//! A key identifies a request's identity class: method plus full path and
//! query, optionally a session id, optionally a validator token. Keeping the
//! validator in the key lets one logical resource hold two entries side by
//! side, a full 200 body and a 304 marker, so clients with differing
//! validators both get correct treatment.
//!
//! No normalization is applied to path casing or query-parameter order;
//! callers that need it supply a custom generator via
//! [`CacheMiddleware::with_cache_key`](crate::CacheMiddleware::with_cache_key).

use crate::body::Request;
use http::header::IF_NONE_MATCH;
use std::sync::Arc;

/// Custom cache key generator. Its output is used verbatim.
pub type KeyGenerator = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Session identifier, inserted into request extensions by whatever session
/// layer runs ahead of the cache.
///
/// Only consulted when session awareness is enabled; keying per session
/// keeps one user's cached data from being served to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

/// Everything needed to derive this request's keys, snapshotted before the
/// request is handed to the pipeline.
///
/// The write-back path runs after the request has been consumed, so the key
/// inputs are captured up front. For a capture that resolves to a 304 the
/// write key folds in the validator the handler actually produced, not the
/// one the client sent.
#[derive(Debug, Clone)]
pub(crate) enum KeySeed {
    /// A custom generator already produced the full key.
    Custom(String),
    /// Components for the default generator.
    Default {
        method: String,
        uri: String,
        session: Option<String>,
        incoming_validator: Option<String>,
    },
}

impl KeySeed {
    pub(crate) fn from_request(
        req: &Request,
        session_aware: bool,
        generator: Option<&KeyGenerator>,
    ) -> Self {
        if let Some(generate) = generator {
            return KeySeed::Custom(generate(req));
        }

        let session = if session_aware {
            req.extensions().get::<SessionId>().map(|s| s.0.clone())
        } else {
            None
        };

        let incoming_validator = req
            .headers()
            .get(IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        KeySeed::Default {
            method: req.method().as_str().to_ascii_uppercase(),
            uri: req.uri().to_string(),
            session,
            incoming_validator,
        }
    }

    /// Key used for the lookup and for storing non-304 captures.
    ///
    /// Sample: `GET-/users?page=2-sess42-W/"4c97-lSwvAg"`.
    pub(crate) fn request_key(&self) -> String {
        self.key_with(self.incoming_validator())
    }

    /// Key used when storing a capture, folding in the validator the
    /// response carried. Custom generators are used verbatim either way.
    pub(crate) fn write_key(&self, response_validator: Option<&str>) -> String {
        match response_validator {
            Some(v) => self.key_with(Some(v)),
            None => self.request_key(),
        }
    }

    fn incoming_validator(&self) -> Option<&str> {
        match self {
            KeySeed::Custom(_) => None,
            KeySeed::Default {
                incoming_validator, ..
            } => incoming_validator.as_deref(),
        }
    }

    fn key_with(&self, validator: Option<&str>) -> String {
        match self {
            KeySeed::Custom(key) => key.clone(),
            KeySeed::Default {
                method,
                uri,
                session,
                ..
            } => {
                let mut key = format!("{method}-{uri}");
                if let Some(session) = session {
                    key.push('-');
                    key.push_str(session);
                }
                if let Some(validator) = validator {
                    key.push('-');
                    key.push_str(validator);
                }
                key
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request(uri: &str) -> Request {
        http::Request::builder()
            .method(http::Method::GET)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn default_key_is_method_and_full_uri() {
        let req = request("/users?page=2");
        let seed = KeySeed::from_request(&req, false, None);
        assert_eq!(seed.request_key(), "GET-/users?page=2");
    }

    #[test]
    fn session_component_requires_awareness_and_an_id() {
        let mut req = request("/users");
        req.extensions_mut().insert(SessionId("sess42".into()));

        let aware = KeySeed::from_request(&req, true, None);
        assert_eq!(aware.request_key(), "GET-/users-sess42");

        let unaware = KeySeed::from_request(&req, false, None);
        assert_eq!(unaware.request_key(), "GET-/users");

        let no_session = KeySeed::from_request(&request("/users"), true, None);
        assert_eq!(no_session.request_key(), "GET-/users");
    }

    #[test]
    fn incoming_validator_is_appended() {
        let req = http::Request::builder()
            .uri("/users")
            .header("if-none-match", "W/\"4c97\"")
            .body(Bytes::new())
            .unwrap();
        let seed = KeySeed::from_request(&req, false, None);
        assert_eq!(seed.request_key(), "GET-/users-W/\"4c97\"");
    }

    #[test]
    fn write_key_prefers_the_response_validator() {
        let req = request("/users");
        let seed = KeySeed::from_request(&req, false, None);
        assert_eq!(seed.write_key(Some("\"etag-200\"")), "GET-/users-\"etag-200\"");
        assert_eq!(seed.write_key(None), "GET-/users");
    }

    #[test]
    fn custom_generator_output_is_used_verbatim() {
        let req = request("/users?page=2");
        let generator: KeyGenerator = Arc::new(|req: &Request| format!("custom:{}", req.uri().path()));
        let seed = KeySeed::from_request(&req, true, Some(&generator));
        assert_eq!(seed.request_key(), "custom:/users");
        // Response validators never alter a custom key.
        assert_eq!(seed.write_key(Some("\"v\"")), "custom:/users");
    }

    #[test]
    fn no_normalization_of_query_order_or_casing() {
        let a = KeySeed::from_request(&request("/Users?b=2&a=1"), false, None);
        let b = KeySeed::from_request(&request("/users?a=1&b=2"), false, None);
        assert_ne!(a.request_key(), b.request_key());
    }
}
