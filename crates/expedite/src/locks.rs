//! Per-key capture locks
//!
//! Prevents two concurrent requests for the same cache key from both
//! buffering the response in memory. Whichever request observes the key
//! unheld first becomes the capturing owner; everyone else streams straight
//! through. This is an in-process guard only, not a data lock for the store.

use dashmap::DashSet;

/// In-process table of cache keys with a capture currently in flight.
///
/// One table is shared by a middleware instance and everything derived from
/// it via the `with_*` builders; independent roots get independent tables.
#[derive(Debug, Default)]
pub struct LockTable {
    held: DashSet<String>,
}

impl LockTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lock for `key`.
    ///
    /// Returns `true` if this caller now owns it. A single atomic insert, so
    /// exactly one of any number of concurrent callers wins.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.held.insert(key.to_string())
    }

    /// Release the lock for `key`. Releasing an unheld key is a no-op.
    pub fn release(&self, key: &str) {
        self.held.remove(key);
    }

    /// Whether a capture is currently in flight for `key`.
    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acquire_release_round_trip() {
        let locks = LockTable::new();
        assert!(!locks.is_held("GET-/users"));
        assert!(locks.try_acquire("GET-/users"));
        assert!(locks.is_held("GET-/users"));
        locks.release("GET-/users");
        assert!(!locks.is_held("GET-/users"));
    }

    #[test]
    fn second_acquire_for_same_key_fails() {
        let locks = LockTable::new();
        assert!(locks.try_acquire("k"));
        assert!(!locks.try_acquire("k"));
    }

    #[test]
    fn keys_are_independent() {
        let locks = LockTable::new();
        assert!(locks.try_acquire("a"));
        assert!(locks.try_acquire("b"));
        locks.release("a");
        assert!(!locks.is_held("a"));
        assert!(locks.is_held("b"));
    }

    #[test]
    fn release_of_unheld_key_is_a_noop() {
        let locks = LockTable::new();
        locks.release("never-held");
        assert!(locks.try_acquire("never-held"));
    }

    #[test]
    fn exactly_one_concurrent_acquirer_wins() {
        let locks = Arc::new(LockTable::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let locks = locks.clone();
            handles.push(std::thread::spawn(move || locks.try_acquire("hot-key")));
        }
        let winners: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
        assert!(locks.is_held("hot-key"));
    }
}
