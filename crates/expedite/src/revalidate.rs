//! Conditional revalidation
//!
//! Decides whether a cache hit can be answered with a bare 304 instead of
//! replaying the full body. Validator tokens are compared byte for byte;
//! weak/strong markers are preserved as-is and never normalized.

/// True when the client's validator token matches the cached entry's.
///
/// Both tokens must be present; an absent token on either side always means
/// the full body is replayed.
pub fn not_modified(incoming: Option<&str>, cached: Option<&str>) -> bool {
    match (incoming, cached) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
