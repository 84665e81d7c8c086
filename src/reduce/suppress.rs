//! User-curated suppression substrings
//!
//! Content containing any suppressed substring (case-insensitive) never
//! becomes a notification. The list is edited from the foreground path while
//! the pipeline runs, so it carries its own lock.

use std::sync::Mutex;

#[derive(Default)]
pub struct SuppressionList {
    // Stored lowercased; matching is case-insensitive
    entries: Mutex<Vec<String>>,
}

impl SuppressionList {
    pub fn new(initial: &[String]) -> Self {
        let list = Self::default();
        for entry in initial {
            list.add(entry);
        }
        list
    }

    /// Add a suppression substring. Duplicates are ignored.
    pub fn add(&self, entry: &str) {
        let normalized = entry.trim().to_lowercase();
        if normalized.is_empty() {
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains(&normalized) {
            entries.push(normalized);
        }
    }

    pub fn remove(&self, entry: &str) {
        let normalized = entry.trim().to_lowercase();
        self.entries.lock().unwrap().retain(|e| *e != normalized);
    }

    /// True when `content` contains any suppressed substring.
    pub fn is_suppressed(&self, content: &str) -> bool {
        let content_lower = content.to_lowercase();
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|needle| content_lower.contains(needle.as_str()))
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}
