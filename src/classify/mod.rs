//! Pattern-based event classification
//!
//! An ordered chain of classifiers decides which semantic category, if any, a
//! parsed line belongs to: AI output first, then task completion, then the
//! dev workflow (with a build/test secondary split), then user-defined custom
//! rules. The first classifier to match wins; no further classifiers run.
//!
//! Lines carrying an explicit semantic tag (AI_RESPONSE, TASK_COMPLETE,
//! BUILD, TEST) map straight to their category without consulting content
//! patterns; the chain exists for untyped OUTPUT lines and terminal
//! notifications.

mod patterns;
mod rules;

pub use patterns::{CompiledPattern, PatternSet, PatternSpec, RegexCache};
pub use rules::{CustomRuleConfig, CustomRuleSet, RuleMatch};

use crate::events::{ClassifiedCandidate, EventCategory, LineType, ParsedLogEntry};
use std::sync::Arc;

/// Built-in AI assistant output patterns.
fn ai_output_specs() -> Vec<PatternSpec> {
    vec![
        PatternSpec::substring("assistant:"),
        PatternSpec::substring("claude"),
        PatternSpec::substring("copilot"),
        PatternSpec::substring("response complete"),
        PatternSpec::regex(r"\b(ai|model)\s+(response|output)\b"),
        PatternSpec::regex(r"\bgenerat(ed|ing)\s+(code|response|answer)\b"),
    ]
}

/// Built-in task-completion patterns.
fn task_completion_specs() -> Vec<PatternSpec> {
    vec![
        PatternSpec::substring("task complete"),
        PatternSpec::substring("task finished"),
        PatternSpec::substring("all done"),
        PatternSpec::substring("✓ done"),
        PatternSpec::regex(r"\b(finished|completed)\s+in\s+\d+(\.\d+)?\s*(ms|s|m)\b"),
        PatternSpec::regex(r"\bdone\s*[.!]?\s*$"),
    ]
}

/// Built-in dev-workflow patterns (build and test indicators combined).
fn dev_workflow_specs() -> Vec<PatternSpec> {
    let mut specs = vec![
        PatternSpec::substring("compiling"),
        PatternSpec::substring("build succeeded"),
        PatternSpec::substring("build failed"),
        PatternSpec::substring("build finished"),
        PatternSpec::substring("linking"),
        PatternSpec::regex(r"\bbuild\s+(completed|passed|failed|ok)\b"),
    ];
    specs.extend(test_indicator_specs());
    specs
}

/// Secondary check deciding test vs. build within the dev workflow.
fn test_indicator_specs() -> Vec<PatternSpec> {
    vec![
        PatternSpec::substring("test result"),
        PatternSpec::substring("tests passed"),
        PatternSpec::substring("tests failed"),
        PatternSpec::substring("running tests"),
        PatternSpec::regex(r"\b\d+\s+(passed|failed);?\s"),
        PatternSpec::regex(r"\btest(s|ed)?\s+(passed|failed|ok)\b"),
    ]
}

/// Ordered chain of pattern classifiers plus the user rule set.
pub struct ClassifierChain {
    cache: Arc<RegexCache>,
    ai_output: PatternSet,
    task_completion: PatternSet,
    dev_workflow: PatternSet,
    test_indicators: PatternSet,
    custom_rules: CustomRuleSet,
}

impl ClassifierChain {
    pub fn new(custom_rules: &[CustomRuleConfig]) -> Self {
        let cache = Arc::new(RegexCache::new());
        let ai_output = PatternSet::compile(&ai_output_specs(), &cache);
        let task_completion = PatternSet::compile(&task_completion_specs(), &cache);
        let dev_workflow = PatternSet::compile(&dev_workflow_specs(), &cache);
        let test_indicators = PatternSet::compile(&test_indicator_specs(), &cache);
        let custom = CustomRuleSet::new(custom_rules, &cache);
        Self {
            cache,
            ai_output,
            task_completion,
            dev_workflow,
            test_indicators,
            custom_rules: custom,
        }
    }

    /// Swap in a fresh user rule set (called from the foreground path while
    /// the pipeline runs).
    pub fn update_custom_rules(&self, configs: &[CustomRuleConfig]) {
        self.custom_rules.update(configs, &self.cache);
    }

    /// Classify a parsed entry into a candidate, or `None` when nothing in
    /// the chain matches. CMD_START/CMD_END records are never candidates;
    /// they feed session tracking only.
    pub fn classify(&self, entry: &ParsedLogEntry) -> Option<ClassifiedCandidate> {
        match entry.line_type {
            LineType::CommandStart | LineType::CommandEnd => None,
            LineType::AiResponse => Some(self.tagged(entry, EventCategory::AiOutput)),
            LineType::TaskComplete => Some(self.tagged(entry, EventCategory::TaskComplete)),
            LineType::Build => Some(self.tagged(entry, EventCategory::Build)),
            LineType::Test => Some(self.tagged(entry, EventCategory::Test)),
            LineType::Output | LineType::TerminalNotification => self.classify_content(entry),
        }
    }

    fn tagged(&self, entry: &ParsedLogEntry, category: EventCategory) -> ClassifiedCandidate {
        ClassifiedCandidate {
            entry: entry.clone(),
            category,
            matched_pattern: entry.line_type.tag().to_string(),
            is_regex_match: false,
        }
    }

    fn classify_content(&self, entry: &ParsedLogEntry) -> Option<ClassifiedCandidate> {
        let content = &entry.payload;

        if let Some(hit) = self.ai_output.find_match(content) {
            return Some(self.candidate(entry, EventCategory::AiOutput, hit));
        }
        if let Some(hit) = self.task_completion.find_match(content) {
            return Some(self.candidate(entry, EventCategory::TaskComplete, hit));
        }
        if let Some(hit) = self.dev_workflow.find_match(content) {
            // Secondary split: test indicators take precedence over build
            let category = if self.test_indicators.find_match(content).is_some() {
                EventCategory::Test
            } else {
                EventCategory::Build
            };
            return Some(self.candidate(entry, category, hit));
        }
        if let Some(rule_match) = self.custom_rules.find_match(content) {
            return Some(ClassifiedCandidate {
                entry: entry.clone(),
                category: EventCategory::Custom,
                matched_pattern: rule_match.matched_pattern,
                is_regex_match: rule_match.is_regex_match,
            });
        }
        None
    }

    fn candidate(
        &self,
        entry: &ParsedLogEntry,
        category: EventCategory,
        hit: &CompiledPattern,
    ) -> ClassifiedCandidate {
        ClassifiedCandidate {
            entry: entry.clone(),
            category,
            matched_pattern: hit.raw().to_string(),
            is_regex_match: hit.is_regex(),
        }
    }
}
