//! Per-category notification throttling with dismissal-driven backoff
//!
//! Each category gets a minimum inter-notification interval. Users who keep
//! dismissing a category are asking for less of it: the interval widens ×2
//! after more than 5 recorded dismissals and ×4 after more than 10.

use crate::events::EventCategory;
use ahash::{HashMap, HashMapExt};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct ThrottleState {
    last_notified: HashMap<EventCategory, Instant>,
    dismissals: HashMap<EventCategory, u32>,
}

pub struct ThrottleController {
    base_interval: Duration,
    state: Mutex<ThrottleState>,
}

impl ThrottleController {
    pub fn new(base_interval: Duration) -> Self {
        Self {
            base_interval,
            state: Mutex::new(ThrottleState {
                last_notified: HashMap::new(),
                dismissals: HashMap::new(),
            }),
        }
    }

    /// Gate a notification for `category`. Under the interval the call
    /// returns true without touching state; otherwise the category's
    /// last-notified instant advances to now and the notification may pass.
    pub fn should_throttle(&self, category: EventCategory) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        let interval = interval_for(
            self.base_interval,
            state.dismissals.get(&category).copied().unwrap_or(0),
        );
        if let Some(last) = state.last_notified.get(&category) {
            if now.duration_since(*last) < interval {
                return true;
            }
        }
        state.last_notified.insert(category, now);
        false
    }

    /// Current effective interval for `category` given its dismissal history.
    pub fn suggested_interval(&self, category: EventCategory) -> Duration {
        let state = self.state.lock().unwrap();
        interval_for(
            self.base_interval,
            state.dismissals.get(&category).copied().unwrap_or(0),
        )
    }

    pub fn record_dismissal(&self, category: EventCategory) {
        let mut state = self.state.lock().unwrap();
        *state.dismissals.entry(category).or_insert(0) += 1;
    }

    pub fn reset_dismissal_counts(&self) {
        self.state.lock().unwrap().dismissals.clear();
    }

    pub fn dismissal_count(&self, category: EventCategory) -> u32 {
        self.state
            .lock()
            .unwrap()
            .dismissals
            .get(&category)
            .copied()
            .unwrap_or(0)
    }
}

/// Monotonic backoff: base for ≤5 dismissals, ×2 for 6–10, ×4 beyond.
fn interval_for(base: Duration, dismissals: u32) -> Duration {
    if dismissals > 10 {
        base * 4
    } else if dismissals > 5 {
        base * 2
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_notification_passes() {
        let throttle = ThrottleController::new(Duration::from_secs(60));
        assert!(!throttle.should_throttle(EventCategory::Build));
    }

    #[test]
    fn test_rapid_repeat_is_throttled() {
        let throttle = ThrottleController::new(Duration::from_secs(60));
        assert!(!throttle.should_throttle(EventCategory::Build));
        assert!(throttle.should_throttle(EventCategory::Build));
    }

    #[test]
    fn test_categories_throttled_independently() {
        let throttle = ThrottleController::new(Duration::from_secs(60));
        assert!(!throttle.should_throttle(EventCategory::Build));
        assert!(!throttle.should_throttle(EventCategory::Test));
    }

    #[test]
    fn test_interval_elapses() {
        let throttle = ThrottleController::new(Duration::from_millis(20));
        assert!(!throttle.should_throttle(EventCategory::AiOutput));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!throttle.should_throttle(EventCategory::AiOutput));
    }

    #[test]
    fn test_throttled_call_does_not_reset_window() {
        let throttle = ThrottleController::new(Duration::from_millis(40));
        assert!(!throttle.should_throttle(EventCategory::Custom));

        std::thread::sleep(Duration::from_millis(25));
        // Still inside the window; must not push the window forward
        assert!(throttle.should_throttle(EventCategory::Custom));

        std::thread::sleep(Duration::from_millis(25));
        assert!(!throttle.should_throttle(EventCategory::Custom));
    }

    #[test]
    fn test_backoff_tiers() {
        let base = Duration::from_secs(60);
        let throttle = ThrottleController::new(base);
        let category = EventCategory::TaskComplete;

        for _ in 0..5 {
            throttle.record_dismissal(category);
        }
        assert_eq!(throttle.suggested_interval(category), base);

        throttle.record_dismissal(category);
        assert_eq!(throttle.suggested_interval(category), base * 2);

        for _ in 0..5 {
            throttle.record_dismissal(category);
        }
        assert_eq!(throttle.dismissal_count(category), 11);
        assert_eq!(throttle.suggested_interval(category), base * 4);
    }

    #[test]
    fn test_reset_restores_base_interval() {
        let base = Duration::from_secs(60);
        let throttle = ThrottleController::new(base);
        for _ in 0..12 {
            throttle.record_dismissal(EventCategory::Build);
        }
        assert_eq!(throttle.suggested_interval(EventCategory::Build), base * 4);

        throttle.reset_dismissal_counts();
        assert_eq!(throttle.suggested_interval(EventCategory::Build), base);
    }
}
