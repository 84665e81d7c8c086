//! Time-windowed content deduplication
//!
//! A candidate whose content hash was already seen inside the window is a
//! duplicate. Entries are recorded at first sight and purged once they age
//! past the window, either lazily on lookup or by the periodic sweep the
//! orchestrator drives.

use ahash::{HashMap, HashMapExt};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Stable content fingerprint: first 16 hex chars of a BLAKE3 digest.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex()[..16].to_string()
}

/// Window-scoped duplicate detector keyed on content hashes.
pub struct DedupTable {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DedupTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// True when `hash` was first seen inside the window. A fresh hash is
    /// recorded with the current instant; a duplicate keeps its original
    /// first-seen time.
    pub fn is_duplicate(&self, hash: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap();
        match seen.get(hash) {
            Some(first_seen) if now.duration_since(*first_seen) < self.window => true,
            _ => {
                seen.insert(hash.to_string(), now);
                false
            }
        }
    }

    /// Drop entries older than the window to bound memory. Called from the
    /// orchestrator's sweep tick (~10 s).
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap();
        let before = seen.len();
        seen.retain(|_, first_seen| now.duration_since(*first_seen) < self.window);
        let purged = before - seen.len();
        if purged > 0 {
            tracing::trace!(purged, remaining = seen.len(), "Dedup sweep");
        }
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_is_not_duplicate() {
        let table = DedupTable::new(Duration::from_secs(5));
        let hash = content_hash("build finished");
        assert!(!table.is_duplicate(&hash));
        assert!(table.is_duplicate(&hash));
    }

    #[test]
    fn test_expires_after_window() {
        let table = DedupTable::new(Duration::from_millis(30));
        let hash = content_hash("tests passed");
        assert!(!table.is_duplicate(&hash));
        assert!(table.is_duplicate(&hash));

        std::thread::sleep(Duration::from_millis(40));
        assert!(!table.is_duplicate(&hash));
    }

    #[test]
    fn test_purge_bounds_memory() {
        let table = DedupTable::new(Duration::from_millis(10));
        for i in 0..100 {
            table.is_duplicate(&content_hash(&format!("line {}", i)));
        }
        assert_eq!(table.len(), 100);

        std::thread::sleep(Duration::from_millis(20));
        table.purge_expired();
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_distinct_content_distinct_hashes() {
        assert_ne!(content_hash("alpha"), content_hash("beta"));
        assert_eq!(content_hash("alpha").len(), 16);
    }
}
