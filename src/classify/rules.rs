//! User-defined custom pattern rules
//!
//! Rules are evaluated independently of the built-in classifiers, sorted
//! descending by user-assigned priority, first enabled match wins. Ties keep
//! insertion order. The set is recompiled wholesale whenever the user edits
//! their rules, which is rare enough that rebuild cost does not matter.

use crate::classify::patterns::{PatternSet, PatternSpec, RegexCache};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// One custom rule as it appears in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRuleConfig {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
}

fn default_enabled() -> bool {
    true
}

struct CompiledRule {
    name: String,
    enabled: bool,
    priority: i32,
    // Single-pattern set keeps the compile-or-skip behavior in one place
    pattern: PatternSet,
}

/// Mutable, lock-guarded set of user rules.
pub struct CustomRuleSet {
    rules: Mutex<Vec<CompiledRule>>,
}

/// A custom-rule hit.
pub struct RuleMatch {
    pub rule_name: String,
    pub matched_pattern: String,
    pub is_regex_match: bool,
}

impl CustomRuleSet {
    pub fn new(configs: &[CustomRuleConfig], cache: &RegexCache) -> Self {
        let set = Self {
            rules: Mutex::new(Vec::new()),
        };
        set.update(configs, cache);
        set
    }

    /// Replace every rule, recompiling patterns. Invalid regexes are skipped
    /// inside `PatternSet::compile`, leaving the rule present but inert.
    pub fn update(&self, configs: &[CustomRuleConfig], cache: &RegexCache) {
        let mut compiled: Vec<CompiledRule> = configs
            .iter()
            .map(|cfg| {
                let spec = if cfg.is_regex {
                    PatternSpec::regex(&cfg.pattern)
                } else {
                    PatternSpec::substring(&cfg.pattern)
                };
                CompiledRule {
                    name: cfg.name.clone(),
                    enabled: cfg.enabled,
                    priority: cfg.priority,
                    pattern: PatternSet::compile(std::slice::from_ref(&spec), cache),
                }
            })
            .collect();

        // Stable sort: descending priority, insertion order breaks ties
        compiled.sort_by_key(|rule| std::cmp::Reverse(rule.priority));

        *self.rules.lock().unwrap() = compiled;
    }

    /// First enabled rule matching `content`, honoring priority order.
    pub fn find_match(&self, content: &str) -> Option<RuleMatch> {
        let rules = self.rules.lock().unwrap();
        for rule in rules.iter().filter(|r| r.enabled) {
            if let Some(hit) = rule.pattern.find_match(content) {
                return Some(RuleMatch {
                    rule_name: rule.name.clone(),
                    matched_pattern: hit.raw().to_string(),
                    is_regex_match: hit.is_regex(),
                });
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.rules.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, pattern: &str, priority: i32) -> CustomRuleConfig {
        CustomRuleConfig {
            name: name.to_string(),
            pattern: pattern.to_string(),
            is_regex: false,
            enabled: true,
            priority,
        }
    }

    #[test]
    fn test_priority_order_wins() {
        let cache = RegexCache::new();
        let set = CustomRuleSet::new(
            &[rule("low", "deploy", 1), rule("high", "deploy", 10)],
            &cache,
        );
        let hit = set.find_match("deploy finished").unwrap();
        assert_eq!(hit.rule_name, "high");
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let cache = RegexCache::new();
        let set = CustomRuleSet::new(
            &[rule("first", "deploy", 5), rule("second", "deploy", 5)],
            &cache,
        );
        let hit = set.find_match("deploy finished").unwrap();
        assert_eq!(hit.rule_name, "first");
    }

    #[test]
    fn test_disabled_rules_skipped() {
        let cache = RegexCache::new();
        let mut disabled = rule("off", "deploy", 10);
        disabled.enabled = false;
        let set = CustomRuleSet::new(&[disabled, rule("on", "deploy", 1)], &cache);
        let hit = set.find_match("deploy finished").unwrap();
        assert_eq!(hit.rule_name, "on");
    }

    #[test]
    fn test_update_replaces_rules() {
        let cache = RegexCache::new();
        let set = CustomRuleSet::new(&[rule("old", "alpha", 1)], &cache);
        assert!(set.find_match("alpha").is_some());

        set.update(&[rule("new", "beta", 1)], &cache);
        assert!(set.find_match("alpha").is_none());
        assert!(set.find_match("beta").is_some());
    }
}
