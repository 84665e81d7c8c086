//! Filesystem change watching behind a backend-neutral trait
//!
//! The pipeline only needs a stream of "the log's directory changed" signals;
//! how they are produced is a backend detail. `NotifyWatcher` wraps the
//! `notify` crate (FSEvents on macOS, inotify on Linux) and watches the log's
//! parent directory so rotations that replace the file are still seen.
//! `PollWatcher` stats the file on a fixed interval as the portable fallback.
//! Burst coalescing (debounce) happens in the pipeline worker, not here.

use crate::error::{Result, TermpulseError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// A content-change signal. Carries no payload; the tailer decides what, if
/// anything, actually changed.
#[derive(Debug, Clone, Copy)]
pub struct ChangeSignal;

/// Source of change signals for one log file.
pub trait ChangeWatcher: Send {
    /// Begin watching `path`, delivering signals through `signal_tx`.
    fn start(&mut self, path: &Path, signal_tx: mpsc::Sender<ChangeSignal>) -> Result<()>;

    /// Stop watching. Safe to call repeatedly or before `start`.
    fn stop(&mut self);
}

/// OS-notification-backed watcher.
#[derive(Default)]
pub struct NotifyWatcher {
    watcher: Option<RecommendedWatcher>,
}

impl NotifyWatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeWatcher for NotifyWatcher {
    fn start(&mut self, path: &Path, signal_tx: mpsc::Sender<ChangeSignal>) -> Result<()> {
        self.stop();

        let log_path = path.to_path_buf();
        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(_) => return,
                };
                if !is_content_change(&event.kind) {
                    return;
                }
                // Directory watch sees sibling files too; only the log
                // itself (or its replacement during rotation) matters.
                if !event.paths.is_empty() && !event.paths.iter().any(|p| *p == log_path) {
                    return;
                }
                // Full channel means a trigger is already pending; the
                // debounced pass will pick up whatever changed.
                let _ = signal_tx.try_send(ChangeSignal);
            },
        )
        .map_err(|e| TermpulseError::Watcher(e.to_string()))?;

        // Watch the parent so rotation (unlink + recreate) is observed
        let watch_target = path.parent().unwrap_or(path);
        watcher
            .watch(watch_target, RecursiveMode::NonRecursive)
            .map_err(|e| TermpulseError::Watcher(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Filesystem watcher started");
        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the watcher tears down the OS subscription
        self.watcher = None;
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

/// Timer-driven fallback watcher: signals whenever the file's size or
/// modification time differs from the last poll.
pub struct PollWatcher {
    interval: Duration,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl PollWatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            handle: None,
        }
    }
}

impl ChangeWatcher for PollWatcher {
    fn start(&mut self, path: &Path, signal_tx: mpsc::Sender<ChangeSignal>) -> Result<()> {
        self.stop();

        let path: PathBuf = path.to_path_buf();
        let interval = self.interval;
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last_seen: Option<(u64, std::time::SystemTime)> = None;
            loop {
                ticker.tick().await;
                let current = std::fs::metadata(&task_path)
                    .ok()
                    .map(|m| (m.len(), m.modified().unwrap_or(std::time::UNIX_EPOCH)));
                if current != last_seen {
                    last_seen = current;
                    if signal_tx.send(ChangeSignal).await.is_err() {
                        // Pipeline dropped its receiver; nothing to watch for
                        break;
                    }
                }
            }
        });

        tracing::debug!(path = %path.display(), "Polling watcher started");
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PollWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_poll_watcher_signals_on_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity.log");
        std::fs::write(&path, "seed\n").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut watcher = PollWatcher::new(Duration::from_millis(10));
        watcher.start(&path, tx).unwrap();

        // Initial poll observes the file for the first time
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("initial signal")
            .unwrap();

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"more\n").unwrap();
        drop(file);

        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("append signal")
            .unwrap();

        watcher.stop();
    }

    #[tokio::test]
    async fn test_poll_watcher_stop_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let mut watcher = PollWatcher::new(Duration::from_millis(50));
        watcher.start(&dir.path().join("x.log"), tx).unwrap();
        watcher.stop();
        watcher.stop();
    }

    #[tokio::test]
    async fn test_notify_watcher_signals_on_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity.log");
        std::fs::write(&path, "").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut watcher = NotifyWatcher::new();
        watcher.start(&path, tx).unwrap();

        // Give the backend a moment to establish the watch
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"2026-02-09T10:30:00+00:00|OUTPUT|hi\n").unwrap();
        file.sync_all().unwrap();
        drop(file);

        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("change signal")
            .unwrap();

        watcher.stop();
    }
}
