//! False-positive reduction
//!
//! Every classified candidate passes a gate chain that short-circuits on the
//! first failure: minimum length, user suppression, windowed deduplication,
//! then a confidence score compared against the detection threshold. Only
//! survivors become notifications.

mod dedup;
mod suppress;

pub use dedup::{content_hash, DedupTable};
pub use suppress::SuppressionList;

use crate::events::{ClassifiedCandidate, EventCategory};
use std::time::Duration;

/// Vocabulary that corroborates a match when found in surrounding lines.
const CONFIRMING_VOCABULARY: &[&str] = &[
    "completed", "finished", "done", "success", "passed", "error", "failed", "warning", "build",
    "test",
];

/// Trimmed content shorter than this is rejected outright.
const MIN_CONTENT_LENGTH: usize = 3;

/// Tuning knobs for the reducer, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ReducerConfig {
    pub dedup_window: Duration,
    /// Scores below this never become notifications
    pub detection_threshold: f64,
    /// Lines of surrounding context consulted for confirming vocabulary
    pub context_window: usize,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(5),
            detection_threshold: 0.5,
            context_window: 3,
        }
    }
}

/// Verdict for one candidate.
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub matched: bool,
    pub confidence: f64,
    pub category: Option<EventCategory>,
    pub context: Vec<String>,
}

impl DetectionOutcome {
    fn rejected() -> Self {
        Self {
            matched: false,
            confidence: 0.0,
            category: None,
            context: Vec::new(),
        }
    }
}

/// Gate chain between classification and notification.
pub struct FalsePositiveReducer {
    config: ReducerConfig,
    suppressions: SuppressionList,
    dedup: DedupTable,
}

impl FalsePositiveReducer {
    pub fn new(config: ReducerConfig, suppressed: &[String]) -> Self {
        let dedup = DedupTable::new(config.dedup_window);
        Self {
            config,
            suppressions: SuppressionList::new(suppressed),
            dedup,
        }
    }

    pub fn suppressions(&self) -> &SuppressionList {
        &self.suppressions
    }

    pub fn dedup(&self) -> &DedupTable {
        &self.dedup
    }

    pub fn context_window(&self) -> usize {
        self.config.context_window
    }

    /// Run the gate chain. `context` holds surrounding lines (up to the
    /// configured window before and after the candidate's line).
    pub fn evaluate(
        &self,
        candidate: &ClassifiedCandidate,
        context: &[String],
    ) -> DetectionOutcome {
        let content = candidate.entry.payload.trim();

        // Gate 1: minimum length
        if content.chars().count() < MIN_CONTENT_LENGTH {
            return DetectionOutcome::rejected();
        }

        // Gate 2: user suppression
        if self.suppressions.is_suppressed(content) {
            tracing::debug!(content, "Candidate suppressed by user pattern");
            return DetectionOutcome::rejected();
        }

        // Gate 3: windowed deduplication
        if self.dedup.is_duplicate(&content_hash(content)) {
            tracing::debug!(content, "Duplicate candidate inside dedup window");
            return DetectionOutcome::rejected();
        }

        // Gate 4: confidence vs. threshold
        let confidence = calculate_confidence(
            &candidate.matched_pattern,
            candidate.is_regex_match,
            content,
            context,
        );
        let matched = confidence >= self.config.detection_threshold;

        DetectionOutcome {
            matched,
            confidence,
            category: matched.then_some(candidate.category),
            context: context.to_vec(),
        }
    }
}

/// Heuristic confidence score in [0, 1].
///
/// Base 0.5; +0.2 for a regex match; +0.1 for a pattern longer than 10
/// characters; +0.15 when surrounding context contains confirming
/// vocabulary; −0.2 when the content itself is under 10 characters.
pub fn calculate_confidence(
    matched_pattern: &str,
    is_regex: bool,
    content: &str,
    context: &[String],
) -> f64 {
    let mut score: f64 = 0.5;

    if is_regex {
        score += 0.2;
    }
    if matched_pattern.chars().count() > 10 {
        score += 0.1;
    }
    if context.iter().any(|line| {
        let lower = line.to_lowercase();
        CONFIRMING_VOCABULARY.iter().any(|word| lower.contains(word))
    }) {
        score += 0.15;
    }
    if content.chars().count() < 10 {
        score -= 0.2;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LineType, ParsedLogEntry};
    use chrono::Utc;

    fn candidate(payload: &str, pattern: &str, is_regex: bool) -> ClassifiedCandidate {
        ClassifiedCandidate {
            entry: ParsedLogEntry {
                timestamp: Utc::now(),
                line_type: LineType::Output,
                session_id: None,
                command: None,
                exit_code: None,
                payload: payload.to_string(),
            },
            category: EventCategory::TaskComplete,
            matched_pattern: pattern.to_string(),
            is_regex_match: is_regex,
        }
    }

    #[test]
    fn test_confidence_base_case_is_exactly_half() {
        // Plain match, ≥10-char content, short pattern, no context
        let score = calculate_confidence("done", false, "ordinary content here", &[]);
        assert_eq!(score, 0.5);
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_confidence_increments_are_exact() {
        let content = "ordinary content here";
        assert_close(calculate_confidence("done", true, content, &[]), 0.7);
        assert_close(
            calculate_confidence("a pattern longer", false, content, &[]),
            0.6,
        );
        assert_close(
            calculate_confidence("done", false, content, &["build passed".to_string()]),
            0.65,
        );
        assert_close(calculate_confidence("done", false, "tiny", &[]), 0.3);
    }

    #[test]
    fn test_confidence_clamped_to_unit_interval() {
        let score = calculate_confidence(
            "a very long regex pattern",
            true,
            "content of reasonable size",
            &["task completed successfully".to_string()],
        );
        assert!(score <= 1.0);
        // 0.5 + 0.2 + 0.1 + 0.15 = 0.95, still inside the interval
        assert!((score - 0.95).abs() < 1e-9);

        let floor = calculate_confidence("x", false, "ab", &[]);
        assert!(floor >= 0.0);
    }

    #[test]
    fn test_min_length_gate() {
        let reducer = FalsePositiveReducer::new(ReducerConfig::default(), &[]);
        let outcome = reducer.evaluate(&candidate("ok", "done", false), &[]);
        assert!(!outcome.matched);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_suppression_gate() {
        let reducer =
            FalsePositiveReducer::new(ReducerConfig::default(), &["vendor noise".to_string()]);
        let outcome = reducer.evaluate(
            &candidate("VENDOR NOISE: build finished", "build finished", false),
            &[],
        );
        assert!(!outcome.matched);
    }

    #[test]
    fn test_dedup_gate_rejects_second_occurrence() {
        let reducer = FalsePositiveReducer::new(ReducerConfig::default(), &[]);
        let c = candidate("build finished cleanly", "build finished", false);

        let first = reducer.evaluate(&c, &[]);
        assert!(first.matched);

        let second = reducer.evaluate(&c, &[]);
        assert!(!second.matched);
    }

    #[test]
    fn test_dedup_window_expiry_allows_reuse() {
        let config = ReducerConfig {
            dedup_window: Duration::from_millis(30),
            ..ReducerConfig::default()
        };
        let reducer = FalsePositiveReducer::new(config, &[]);
        let c = candidate("tests passed again", "tests passed", false);

        assert!(reducer.evaluate(&c, &[]).matched);
        assert!(!reducer.evaluate(&c, &[]).matched);

        std::thread::sleep(Duration::from_millis(40));
        assert!(reducer.evaluate(&c, &[]).matched);
    }

    #[test]
    fn test_threshold_gate() {
        let config = ReducerConfig {
            detection_threshold: 0.6,
            ..ReducerConfig::default()
        };
        let reducer = FalsePositiveReducer::new(config, &[]);

        // Plain substring match with no boosts scores 0.5, under 0.6
        let outcome = reducer.evaluate(&candidate("build finished cleanly", "done", false), &[]);
        assert!(!outcome.matched);
        assert_eq!(outcome.confidence, 0.5);
    }

    #[test]
    fn test_outcome_carries_category_and_context() {
        let reducer = FalsePositiveReducer::new(ReducerConfig::default(), &[]);
        let context = vec!["cargo build".to_string()];
        let outcome = reducer.evaluate(
            &candidate("build finished cleanly", "build finished", false),
            &context,
        );
        assert!(outcome.matched);
        assert_eq!(outcome.category, Some(EventCategory::TaskComplete));
        assert_eq!(outcome.context, context);
    }
}
