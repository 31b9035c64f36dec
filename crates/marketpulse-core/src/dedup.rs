//! Content-hash deduplication index.

use std::collections::HashSet;
use std::sync::Mutex;

/// In-memory set of seen content hashes, scoped to one run.
///
/// Two independent instances exist per run: the orchestrator's session index
/// (short hashes of raw extracted text) and the store's durable index (full
/// content hashes). The set never evicts; growth over a run's lifetime is an
/// accepted trade-off.
#[derive(Debug, Default)]
pub struct DeduplicationIndex {
    seen: Mutex<HashSet<String>>,
}

impl DeduplicationIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Has this hash been marked before?
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn seen(&self, hash: &str) -> bool {
        self.seen.lock().expect("dedup lock poisoned").contains(hash)
    }

    /// Record a hash as seen.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn mark(&self, hash: &str) {
        self.seen
            .lock()
            .expect("dedup lock poisoned")
            .insert(hash.to_owned());
    }

    /// Atomically mark the hash, returning `true` if it was new.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn check_and_mark(&self, hash: &str) -> bool {
        self.seen
            .lock()
            .expect("dedup lock poisoned")
            .insert(hash.to_owned())
    }

    /// Number of distinct hashes recorded.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().expect("dedup lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_index_has_seen_nothing() {
        let index = DeduplicationIndex::new();
        assert!(!index.seen("abc"));
        assert!(index.is_empty());
    }

    #[test]
    fn marked_hash_is_seen() {
        let index = DeduplicationIndex::new();
        index.mark("abc");
        assert!(index.seen("abc"));
        assert!(!index.seen("def"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn check_and_mark_is_first_wins() {
        let index = DeduplicationIndex::new();
        assert!(index.check_and_mark("abc"));
        assert!(!index.check_and_mark("abc"));
        assert_eq!(index.len(), 1);
    }
}
