//! Detection pipeline orchestrator
//!
//! Owns the tailer, classifier chain, reducer, throttle, session tracker,
//! and the collaborator sinks, and runs them from a single worker task.
//! Change signals from the watcher are debounced before the tailer reads,
//! so bursts of writes collapse into one pass. A slow periodic tick purges
//! the dedup table and sweeps session lifecycle state.

use crate::bus::EventBus;
use crate::cache::RecencyCache;
use crate::classify::ClassifierChain;
use crate::config::Config;
use crate::error::{Result, TermpulseError};
use crate::events::NotificationEvent;
use crate::parser::LogLineParser;
use crate::reduce::{content_hash, FalsePositiveReducer};
use crate::session::SessionTracker;
use crate::sinks::{ErrorSink, NotificationSink, PersistenceSink, Severity};
use crate::tail::FileTailer;
use crate::throttle::ThrottleController;
use crate::watch::{ChangeSignal, ChangeWatcher};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

mod stats;

pub use stats::{PipelineStats, StatsSnapshot};

/// Interval of the maintenance tick; session sweeps run every sixth tick.
const SWEEP_TICK: Duration = Duration::from_secs(10);
const SESSION_SWEEP_EVERY: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Running,
}

enum Control {
    Refresh,
    Stop,
}

/// The assembled detection pipeline. Construct once, then `start`/`stop`.
pub struct Pipeline {
    config: Config,
    watcher: Box<dyn ChangeWatcher>,
    classifier: Arc<ClassifierChain>,
    reducer: Arc<FalsePositiveReducer>,
    cache: Arc<RecencyCache<String, crate::events::ParsedLogEntry>>,
    throttle: Arc<ThrottleController>,
    sessions: Arc<SessionTracker>,
    persistence: Arc<dyn PersistenceSink>,
    notifier: Arc<dyn NotificationSink>,
    errors: Arc<dyn ErrorSink>,
    bus: Arc<EventBus<NotificationEvent>>,
    stats: Arc<PipelineStats>,
    state: PipelineState,
    control_tx: Option<mpsc::Sender<Control>>,
    worker_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        watcher: Box<dyn ChangeWatcher>,
        persistence: Arc<dyn PersistenceSink>,
        notifier: Arc<dyn NotificationSink>,
        errors: Arc<dyn ErrorSink>,
    ) -> Self {
        let classifier = Arc::new(ClassifierChain::new(&config.rules));
        let reducer = Arc::new(FalsePositiveReducer::new(
            config.reducer_config(),
            &config.suppressions,
        ));
        let cache = Arc::new(RecencyCache::new(config.detection.cache_capacity));
        let throttle = Arc::new(ThrottleController::new(config.throttle_interval()));
        let sessions = Arc::new(SessionTracker::new(config.session_config()));

        Self {
            config,
            watcher,
            classifier,
            reducer,
            cache,
            throttle,
            sessions,
            persistence,
            notifier,
            errors,
            bus: Arc::new(EventBus::new()),
            stats: Arc::new(PipelineStats::default()),
            state: PipelineState::Idle,
            control_tx: None,
            worker_handle: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn bus(&self) -> Arc<EventBus<NotificationEvent>> {
        Arc::clone(&self.bus)
    }

    pub fn sessions(&self) -> Arc<SessionTracker> {
        Arc::clone(&self.sessions)
    }

    pub fn throttle(&self) -> Arc<ThrottleController> {
        Arc::clone(&self.throttle)
    }

    pub fn classifier(&self) -> Arc<ClassifierChain> {
        Arc::clone(&self.classifier)
    }

    pub fn reducer(&self) -> Arc<FalsePositiveReducer> {
        Arc::clone(&self.reducer)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Begin watching. The tailer seeks to the end of the activity log first,
    /// so history written before the pipeline started never produces events.
    pub fn start(&mut self) -> Result<()> {
        if self.state == PipelineState::Running {
            tracing::warn!("Pipeline already running");
            return Ok(());
        }

        let mut tailer = FileTailer::new(self.config.log.path.clone());
        tailer.seek_to_end()?;

        let (change_tx, change_rx) = mpsc::channel::<ChangeSignal>(16);
        let (control_tx, control_rx) = mpsc::channel::<Control>(8);
        self.watcher.start(&self.config.log.path, change_tx)?;

        let worker = Worker {
            tailer,
            classifier: Arc::clone(&self.classifier),
            reducer: Arc::clone(&self.reducer),
            cache: Arc::clone(&self.cache),
            throttle: Arc::clone(&self.throttle),
            sessions: Arc::clone(&self.sessions),
            persistence: Arc::clone(&self.persistence),
            notifier: Arc::clone(&self.notifier),
            errors: Arc::clone(&self.errors),
            bus: Arc::clone(&self.bus),
            stats: Arc::clone(&self.stats),
            recent: VecDeque::new(),
            context_window: self.config.detection.context_window,
        };
        let debounce = self.config.debounce();
        self.worker_handle = Some(tokio::spawn(async move {
            worker_loop(worker, change_rx, control_rx, debounce).await;
        }));
        self.control_tx = Some(control_tx);
        self.state = PipelineState::Running;

        tracing::info!(path = %self.config.log.path.display(), "Pipeline started");
        Ok(())
    }

    /// Process any new log content immediately, bypassing the debounce.
    pub fn force_refresh(&self) -> Result<()> {
        let tx = self
            .control_tx
            .as_ref()
            .ok_or_else(|| TermpulseError::Pipeline("Pipeline is not running".to_string()))?;
        tx.try_send(Control::Refresh)
            .map_err(|_| TermpulseError::Pipeline("Pipeline worker unavailable".to_string()))
    }

    /// Apply a new configuration, rebinding the tailer to a possibly changed
    /// log path. Running pipelines restart; session state survives the swap.
    pub async fn rebind(&mut self, config: Config) -> Result<()> {
        let was_running = self.state == PipelineState::Running;
        self.stop().await;

        self.classifier.update_custom_rules(&config.rules);
        self.reducer = Arc::new(FalsePositiveReducer::new(
            config.reducer_config(),
            &config.suppressions,
        ));
        self.cache = Arc::new(RecencyCache::new(config.detection.cache_capacity));
        self.throttle = Arc::new(ThrottleController::new(config.throttle_interval()));
        self.config = config;

        if was_running {
            self.start()?;
        }
        Ok(())
    }

    /// Stop watching: tears down the watcher, drains the worker, and flushes
    /// persistence. Safe to call when already idle.
    pub async fn stop(&mut self) {
        if self.state == PipelineState::Idle {
            return;
        }

        self.watcher.stop();
        if let Some(tx) = self.control_tx.take() {
            let _ = tx.send(Control::Stop).await;
        }
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.await;
        }
        self.persistence.flush();
        self.state = PipelineState::Idle;
        tracing::info!("Pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // A graceful stop() has already taken the handle; this only fires
        // when the pipeline is dropped while still running
        if let Some(handle) = self.worker_handle.take() {
            handle.abort();
        }
    }
}

struct Worker {
    tailer: FileTailer,
    classifier: Arc<ClassifierChain>,
    reducer: Arc<FalsePositiveReducer>,
    cache: Arc<RecencyCache<String, crate::events::ParsedLogEntry>>,
    throttle: Arc<ThrottleController>,
    sessions: Arc<SessionTracker>,
    persistence: Arc<dyn PersistenceSink>,
    notifier: Arc<dyn NotificationSink>,
    errors: Arc<dyn ErrorSink>,
    bus: Arc<EventBus<NotificationEvent>>,
    stats: Arc<PipelineStats>,
    /// Tail payloads of previous batches, for cross-batch context lookback
    recent: VecDeque<String>,
    context_window: usize,
}

async fn worker_loop(
    mut worker: Worker,
    mut change_rx: mpsc::Receiver<ChangeSignal>,
    mut control_rx: mpsc::Receiver<Control>,
    debounce: Duration,
) {
    let mut sweep_timer = time::interval(SWEEP_TICK);
    sweep_timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            Some(control) = control_rx.recv() => match control {
                Control::Refresh => worker.process_new_lines(),
                Control::Stop => break,
            },

            Some(ChangeSignal) = change_rx.recv() => {
                // Coalesce the burst: keep absorbing signals until the log
                // has been quiet for the debounce interval
                while let Ok(Some(ChangeSignal)) = time::timeout(debounce, change_rx.recv()).await {}
                worker.process_new_lines();
            }

            _ = sweep_timer.tick() => {
                ticks += 1;
                worker.reducer.dedup().purge_expired();
                if ticks % SESSION_SWEEP_EVERY == 0 {
                    worker.sessions.check_inactive();
                    worker.sessions.prune_stale();
                }
            }
        }
    }

    // Final drain so lines written just before shutdown are not lost
    worker.process_new_lines();
    tracing::debug!("Pipeline worker finished");
}

impl Worker {
    fn process_new_lines(&mut self) {
        let lines = match self.tailer.read_new_lines() {
            Ok(lines) => lines,
            Err(e) => {
                self.errors
                    .report(&e, "reading activity log", Severity::Warning);
                return;
            }
        };
        if lines.is_empty() {
            return;
        }
        self.stats.record_batch(lines.len() as u64);

        let mut parsed = Vec::with_capacity(lines.len());
        for line in &lines {
            match LogLineParser::parse(line) {
                Some(entry) => parsed.push(entry),
                None => self.stats.record_parse_failure(),
            }
        }
        self.stats.record_parsed(parsed.len() as u64);

        for i in 0..parsed.len() {
            let entry = parsed[i].clone();

            // Recency gate: the same physical line delivered twice (watcher
            // replay, restart near a boundary) must not reprocess
            let key = format!("{}:{}", content_hash(&entry.payload), entry.line_type.tag());
            if self.cache.contains(&key) {
                self.stats.record_duplicate();
                continue;
            }
            self.cache.set(key, entry.clone());

            if let Some(session_id) = &entry.session_id {
                self.sessions.record_activity(session_id);
            }
            self.persistence.append_entry(entry.clone());

            let Some(candidate) = self.classifier.classify(&entry) else {
                continue;
            };
            self.stats.record_candidate();

            let context = self.context_for(&parsed, i);
            let outcome = self.reducer.evaluate(&candidate, &context);
            if !outcome.matched {
                continue;
            }

            if self.throttle.should_throttle(candidate.category) {
                self.stats.record_throttled();
                tracing::debug!(category = ?candidate.category, "Notification throttled");
                continue;
            }

            let event = NotificationEvent::from_candidate(&candidate, outcome.confidence);
            tracing::info!(
                category = ?event.category,
                confidence = event.confidence,
                "Event detected"
            );
            self.notifier.deliver(event.clone());
            self.bus.publish(event);
            self.stats.record_notification();
        }

        // Remember the batch tail for the next batch's lookback context
        for entry in &parsed {
            self.recent.push_back(entry.payload.clone());
            while self.recent.len() > self.context_window {
                self.recent.pop_front();
            }
        }
    }

    /// Surrounding payloads for the entry at `index`: up to `context_window`
    /// lines before (reaching into the previous batch) and after.
    fn context_for(&self, batch: &[crate::events::ParsedLogEntry], index: usize) -> Vec<String> {
        let w = self.context_window;
        let mut context = Vec::new();

        let before_in_batch = index.min(w);
        let from_history = w - before_in_batch;
        if from_history > 0 {
            let skip = self.recent.len().saturating_sub(from_history);
            context.extend(self.recent.iter().skip(skip).cloned());
        }
        for entry in &batch[index - before_in_batch..index] {
            context.push(entry.payload.clone());
        }
        for entry in batch.iter().skip(index + 1).take(w) {
            context.push(entry.payload.clone());
        }
        context
    }
}

/// Notification sink that records events, for assertions in tests.
#[derive(Default)]
pub struct CollectingNotificationSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl CollectingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl NotificationSink for CollectingNotificationSink {
    fn deliver(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{JsonlPersistenceSink, TracingErrorSink};
    use crate::watch::PollWatcher;
    use std::io::Write;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.log.path = dir.path().join("activity.log");
        config.log.store_path = dir.path().join("entries.jsonl");
        config.watch.debounce_ms = 50;
        config
    }

    fn build_pipeline(config: Config) -> (Pipeline, Arc<CollectingNotificationSink>) {
        let notifier = Arc::new(CollectingNotificationSink::new());
        let persistence =
            Arc::new(JsonlPersistenceSink::create(config.log.store_path.clone()).unwrap());
        let pipeline = Pipeline::new(
            config,
            Box::new(PollWatcher::new(Duration::from_millis(20))),
            persistence,
            notifier.clone(),
            Arc::new(TracingErrorSink),
        );
        (pipeline, notifier)
    }

    fn append(path: &std::path::Path, line: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        writeln!(file, "{}", line).unwrap();
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_start_ignores_preexisting_backlog() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        append(
            &config.log.path,
            "2026-02-09T10:00:00+00:00|TASK_COMPLETE|old task finished successfully",
        );

        let (mut pipeline, notifier) = build_pipeline(config);
        pipeline.start().unwrap();
        pipeline.force_refresh().unwrap();
        settle().await;
        pipeline.stop().await;

        assert!(notifier.events().is_empty());
    }

    #[tokio::test]
    async fn test_tagged_line_produces_notification() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let log_path = config.log.path.clone();
        std::fs::write(&log_path, "").unwrap();

        let (mut pipeline, notifier) = build_pipeline(config);
        pipeline.start().unwrap();

        append(
            &log_path,
            "2026-02-09T10:00:01+00:00|TASK_COMPLETE|deploy task finished successfully",
        );
        pipeline.force_refresh().unwrap();
        settle().await;
        pipeline.stop().await;

        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, crate::events::EventCategory::TaskComplete);
        let snapshot = pipeline.stats();
        assert_eq!(snapshot.notifications_sent, 1);
    }

    #[tokio::test]
    async fn test_replayed_line_skipped_by_recency_gate() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let log_path = config.log.path.clone();
        std::fs::write(&log_path, "").unwrap();

        let (mut pipeline, notifier) = build_pipeline(config);
        pipeline.start().unwrap();

        let line = "2026-02-09T10:00:01+00:00|BUILD|release build finished successfully";
        append(&log_path, line);
        pipeline.force_refresh().unwrap();
        settle().await;
        append(&log_path, line);
        pipeline.force_refresh().unwrap();
        settle().await;
        pipeline.stop().await;

        assert_eq!(notifier.events().len(), 1);
        assert_eq!(pipeline.stats().duplicates_skipped, 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_drains() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let log_path = config.log.path.clone();
        std::fs::write(&log_path, "").unwrap();

        let (mut pipeline, _notifier) = build_pipeline(config);
        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);

        pipeline.stop().await;
        assert_eq!(pipeline.state(), PipelineState::Idle);
        pipeline.stop().await;
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_command_records_session_activity() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let log_path = config.log.path.clone();
        std::fs::write(&log_path, "").unwrap();

        let (mut pipeline, _notifier) = build_pipeline(config);
        let sessions = pipeline.sessions();
        pipeline.start().unwrap();

        append(
            &log_path,
            "2026-02-09T10:00:01+00:00|CMD_START|sess42|cargo build",
        );
        append(&log_path, "2026-02-09T10:00:05+00:00|CMD_END|sess42|0");
        pipeline.force_refresh().unwrap();
        settle().await;
        pipeline.stop().await;

        let state = sessions.get("sess42").unwrap();
        assert_eq!(state.command_count, 2);
        assert!(state.is_active);
    }

    #[tokio::test]
    async fn test_rebind_switches_log_path_while_running() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        std::fs::write(&config.log.path, "").unwrap();

        let (mut pipeline, notifier) = build_pipeline(config.clone());
        pipeline.start().unwrap();

        let mut moved = config.clone();
        moved.log.path = dir.path().join("relocated.log");
        std::fs::write(&moved.log.path, "").unwrap();
        pipeline.rebind(moved.clone()).await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);

        append(
            &moved.log.path,
            "2026-02-09T10:00:01+00:00|BUILD|release build finished successfully",
        );
        pipeline.force_refresh().unwrap();
        settle().await;
        pipeline.stop().await;

        assert_eq!(notifier.events().len(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_requires_running_pipeline() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _notifier) = build_pipeline(test_config(&dir));
        assert!(pipeline.force_refresh().is_err());
    }
}
