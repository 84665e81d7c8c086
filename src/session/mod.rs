//! Per-terminal session activity tracking
//!
//! Sessions appear on first activity and accumulate command counts. Two
//! independent periodic sweeps manage their lifecycle: an idle sweep marks
//! sessions inactive after a quiet period and remembers them in a bounded
//! most-recent-first list, and a staleness sweep removes sessions untouched
//! for far longer. Staleness is much larger than idle, so an inactive
//! session stays queryable for a long time before it is pruned.

use ahash::{HashMap, HashMapExt};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Activity state for one terminal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub last_activity_time: DateTime<Utc>,
    pub command_count: u64,
    pub is_active: bool,
}

impl SessionState {
    fn new(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time: now,
            last_activity_time: now,
            command_count: 0,
            is_active: true,
        }
    }
}

/// Lifecycle thresholds; staleness must dwarf idle.
#[derive(Debug, Clone)]
pub struct SessionTrackerConfig {
    pub idle_timeout: Duration,
    pub stale_timeout: Duration,
    pub max_recent_inactive: usize,
}

impl Default for SessionTrackerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::minutes(5),
            stale_timeout: Duration::hours(24),
            max_recent_inactive: 10,
        }
    }
}

struct Inner {
    sessions: HashMap<String, SessionState>,
    /// Most-recent-first ids of sessions the idle sweep retired
    recently_inactive: VecDeque<String>,
}

pub struct SessionTracker {
    config: SessionTrackerConfig,
    inner: Mutex<Inner>,
}

impl SessionTracker {
    pub fn new(config: SessionTrackerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                recently_inactive: VecDeque::new(),
            }),
        }
    }

    /// Fetch a session's state, creating a fresh active one if absent.
    pub fn get_or_create(&self, session_id: &str) -> SessionState {
        let mut inner = self.inner.lock().unwrap();
        inner
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(session_id.to_string(), Utc::now()))
            .clone()
    }

    /// Record one unit of activity: creates the session if needed, bumps the
    /// command count, refreshes the activity time, and reactivates.
    pub fn record_activity(&self, session_id: &str) {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(session_id.to_string(), now));
        state.command_count += 1;
        state.last_activity_time = now;
        state.is_active = true;
    }

    pub fn get(&self, session_id: &str) -> Option<SessionState> {
        self.inner.lock().unwrap().sessions.get(session_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .values()
            .filter(|s| s.is_active)
            .count()
    }

    pub fn recently_inactive(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .recently_inactive
            .iter()
            .cloned()
            .collect()
    }

    /// Idle sweep: mark sessions quiet past the idle timeout as inactive and
    /// push them onto the bounded recently-inactive list.
    pub fn check_inactive(&self) {
        self.sweep_inactive_at(Utc::now());
    }

    fn sweep_inactive_at(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        let idle = self.config.idle_timeout;
        let mut newly_inactive = Vec::new();

        for state in inner.sessions.values_mut() {
            if state.is_active && now - state.last_activity_time > idle {
                state.is_active = false;
                newly_inactive.push(state.id.clone());
            }
        }

        for id in newly_inactive {
            tracing::debug!(session = %id, "Session marked inactive");
            inner.recently_inactive.retain(|existing| *existing != id);
            inner.recently_inactive.push_front(id);
            while inner.recently_inactive.len() > self.config.max_recent_inactive {
                inner.recently_inactive.pop_back();
            }
        }
    }

    /// Staleness sweep: remove sessions untouched past the stale timeout,
    /// active or not. Independent of the idle sweep.
    pub fn prune_stale(&self) {
        self.sweep_stale_at(Utc::now());
    }

    fn sweep_stale_at(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        let stale = self.config.stale_timeout;
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, state| now - state.last_activity_time <= stale);
        let pruned = before - inner.sessions.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Stale sessions removed");
        }
    }
}

/// Short label derived from a session id, e.g. for compact UI rows.
pub fn short_label(session_id: &str) -> String {
    session_id.chars().take(8).collect()
}

/// Namespaced human string for notification context.
pub fn display_name(session_id: &str) -> String {
    format!("Terminal {}", short_label(session_id))
}
