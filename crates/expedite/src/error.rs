//! Error types for expedite
//!
//! The error taxonomy follows one rule: nothing on the per-request cache path
//! can fail a working handler. Store and parse failures degrade to "serve
//! without cache" and are only reported through `tracing`. Configuration
//! problems are the single exception and surface at construction time.

use thiserror::Error;

/// Boxed error type used at the store and body seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Invalid configuration detected while building a middleware instance.
///
/// Never returned on a request path.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The namespace option was missing or empty.
    #[error("namespace must be a non-empty string, e.g. \"users-cache\"")]
    InvalidNamespace,

    /// No default TTL was supplied.
    #[error("a default TTL is required, e.g. 60000 ms or \"1 minute\"")]
    MissingDefaultTtl,

    /// A TTL string could not be parsed into a duration.
    #[error("could not parse TTL {input:?}: {reason}")]
    InvalidTtl {
        /// The TTL text as supplied.
        input: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A TTL string parsed to zero milliseconds.
    #[error("TTL {input:?} must be greater than zero")]
    ZeroTtl {
        /// The TTL text as supplied.
        input: String,
    },

    /// The cache-status header name is not a valid HTTP header name.
    #[error("invalid cache-status header name {name:?}")]
    InvalidHeaderName {
        /// The header name as supplied.
        name: String,
    },
}

/// Captured response bytes that could not be parsed back into a structured
/// response.
///
/// A parse failure discards the capture; the client already received the
/// correct bytes since capture never alters delivery.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The capture did not start with a status line.
    #[error("response is missing a status line")]
    MissingStatusLine,

    /// The status line was present but not understood.
    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),

    /// A header line had no name/value separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// The header block was never terminated by a blank line.
    #[error("header block is not terminated")]
    UnterminatedHeaders,

    /// Fewer body bytes were captured than the declared content-length.
    #[error("body truncated: declared {declared} bytes, captured {captured}")]
    TruncatedBody {
        /// Value of the content-length header.
        declared: usize,
        /// Bytes actually present after the header block.
        captured: usize,
    },

    /// The content-length header did not hold a number.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// A chunk-size line was not valid hexadecimal.
    #[error("malformed chunk size line: {0:?}")]
    MalformedChunkSize(String),

    /// A chunked body ended before its terminal zero-length chunk.
    #[error("chunked body ended before the terminal chunk")]
    TruncatedChunk,
}

/// Opaque failure reported by a cache store engine.
///
/// Lookup failures are treated as a miss; write failures release the
/// capture lock and are logged, never surfaced to the client.
#[derive(Debug, Error)]
#[error("cache store error: {0}")]
pub struct StoreError(BoxError);

impl StoreError {
    /// Wrap an engine error.
    pub fn new<E: Into<BoxError>>(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_wraps_anything_displayable() {
        let err = StoreError::new("engine offline");
        assert_eq!(err.to_string(), "cache store error: engine offline");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "refused");
        assert_eq!(StoreError::new(io).to_string(), "cache store error: refused");
    }

    #[test]
    fn config_errors_render_the_offending_input() {
        let err = ConfigError::InvalidTtl {
            input: "soon".into(),
            reason: "unknown unit".into(),
        };
        assert!(err.to_string().contains("soon"));

        let err = ConfigError::ZeroTtl { input: "0s".into() };
        assert!(err.to_string().contains("0s"));
    }
}
