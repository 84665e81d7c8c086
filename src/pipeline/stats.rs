//! Pipeline throughput counters
//!
//! Cheap atomics updated from the worker, snapshotted for `status` output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct PipelineStats {
    lines_read: AtomicU64,
    entries_parsed: AtomicU64,
    parse_failures: AtomicU64,
    duplicates_skipped: AtomicU64,
    candidates: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_throttled: AtomicU64,
    last_batch_at: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub entries_parsed: u64,
    pub parse_failures: u64,
    pub duplicates_skipped: u64,
    pub candidates: u64,
    pub notifications_sent: u64,
    pub notifications_throttled: u64,
    pub last_batch_at: Option<DateTime<Utc>>,
}

impl PipelineStats {
    pub fn record_batch(&self, lines: u64) {
        self.lines_read.fetch_add(lines, Ordering::Relaxed);
        *self.last_batch_at.lock().unwrap() = Some(Utc::now());
    }

    pub fn record_parsed(&self, entries: u64) {
        self.entries_parsed.fetch_add(entries, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate(&self) {
        self.candidates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.notifications_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            entries_parsed: self.entries_parsed.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_throttled: self.notifications_throttled.load(Ordering::Relaxed),
            last_batch_at: *self.last_batch_at.lock().unwrap(),
        }
    }
}
