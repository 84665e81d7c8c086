//! Pattern primitives shared by all classifiers
//!
//! Patterns are either plain substrings or regular expressions, always
//! matched case-insensitively. Compiled regexes are kept in a shared cache so
//! identical patterns across classifier instances compile once. A pattern
//! that fails to compile is reported and skipped; it never aborts its set.

use ahash::HashMap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A user- or builtin-supplied pattern before compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub pattern: String,
    #[serde(default)]
    pub is_regex: bool,
}

impl PatternSpec {
    pub fn substring(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_regex: false,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_regex: true,
        }
    }
}

/// Shared regex compilation cache, keyed by the raw pattern string.
#[derive(Default)]
pub struct RegexCache {
    compiled: Mutex<HashMap<String, Regex>>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile (or fetch) a case-insensitive regex. Returns `None` and logs a
    /// warning when the pattern is invalid.
    pub fn compile(&self, pattern: &str) -> Option<Regex> {
        let mut compiled = self.compiled.lock().unwrap();
        if let Some(regex) = compiled.get(pattern) {
            return Some(regex.clone());
        }
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(regex) => {
                compiled.insert(pattern.to_string(), regex.clone());
                Some(regex)
            }
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Skipping invalid pattern");
                None
            }
        }
    }

    /// Number of distinct patterns compiled so far.
    pub fn len(&self) -> usize {
        self.compiled.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Matcher {
    /// Lowercased needle for case-insensitive substring search
    Substring(String),
    Regex(Regex),
}

/// A single compiled pattern.
pub struct CompiledPattern {
    raw: String,
    matcher: Matcher,
}

impl CompiledPattern {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_regex(&self) -> bool {
        matches!(self.matcher, Matcher::Regex(_))
    }

    fn matches(&self, content: &str, content_lower: &str) -> bool {
        match &self.matcher {
            Matcher::Substring(needle) => content_lower.contains(needle.as_str()),
            Matcher::Regex(regex) => regex.is_match(content),
        }
    }
}

/// An ordered set of compiled patterns owned by one classifier.
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
}

impl PatternSet {
    /// Compile a set of specs, skipping any invalid regex.
    pub fn compile(specs: &[PatternSpec], cache: &RegexCache) -> Self {
        let mut patterns = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.is_regex {
                if let Some(regex) = cache.compile(&spec.pattern) {
                    patterns.push(CompiledPattern {
                        raw: spec.pattern.clone(),
                        matcher: Matcher::Regex(regex),
                    });
                }
            } else {
                patterns.push(CompiledPattern {
                    raw: spec.pattern.clone(),
                    matcher: Matcher::Substring(spec.pattern.to_lowercase()),
                });
            }
        }
        Self { patterns }
    }

    /// First pattern matching `content`, in set order.
    pub fn find_match(&self, content: &str) -> Option<&CompiledPattern> {
        let content_lower = content.to_lowercase();
        self.patterns
            .iter()
            .find(|p| p.matches(content, &content_lower))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
