//! Static screen
//!
//! Cheap deny-list check run before a snippet reaches a sandbox. A match
//! means the snippet is refused outright (`InfraError(Rejected)`); it is a
//! policy decision about the host, not a verdict on the snippet.

use regex::Regex;
use snipverify_core::{InfraErrorKind, Language, Snippet, VerificationResult};
use std::collections::HashMap;
use std::time::Duration;

/// Python patterns: process spawning, dynamic evaluation, file writes, network
const PYTHON_DENY_LIST: &[&str] = &[
    r"\bos\.system\s*\(",
    r"\bsubprocess\.",
    r"\beval\s*\(",
    r"\bexec\s*\(",
    r#"\bopen\s*\(.+['"]w['"]"#,
    r"\brequests\.",
    r"\burllib\.",
    r"\bsocket\.",
];

/// Per-language deny-list of regular expressions
#[derive(Debug, Clone, Default)]
pub struct StaticScreen {
    rules: HashMap<Language, Vec<Regex>>,
}

impl StaticScreen {
    /// Screen with no rules
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Screen with the built-in Python deny-list
    #[must_use]
    pub fn builtin() -> Self {
        let mut screen = Self::empty();
        for pattern in PYTHON_DENY_LIST {
            if let Ok(re) = Regex::new(pattern) {
                screen.rules.entry(Language::Python).or_default().push(re);
            }
        }
        screen
    }

    /// Add a pattern for `language`
    ///
    /// # Errors
    /// Returns the regex compile error for an invalid pattern
    pub fn with_rule(mut self, language: Language, pattern: &str) -> Result<Self, regex::Error> {
        let re = Regex::new(pattern)?;
        self.rules.entry(language).or_default().push(re);
        Ok(self)
    }

    /// Number of patterns registered for `language`
    #[must_use]
    pub fn rule_count(&self, language: &Language) -> usize {
        self.rules.get(language).map_or(0, Vec::len)
    }

    /// Patterns that match `snippet`; empty means it passed
    #[must_use]
    pub fn matches(&self, snippet: &Snippet) -> Vec<String> {
        self.rules
            .get(snippet.language())
            .into_iter()
            .flatten()
            .filter(|re| re.is_match(snippet.source()))
            .map(|re| re.as_str().to_string())
            .collect()
    }

    /// `Ok` if the snippet passed, otherwise the rejection result
    ///
    /// # Errors
    /// Returns an `InfraError(Rejected)` result listing the matched patterns
    pub fn check(&self, snippet: &Snippet) -> Result<(), VerificationResult> {
        let matched = self.matches(snippet);
        if matched.is_empty() {
            return Ok(());
        }
        tracing::info!(snippet = %snippet.id(), patterns = ?matched, "snippet rejected by static screen");
        Err(VerificationResult::infra(
            InfraErrorKind::Rejected,
            format!("static screen matched: {}", matched.join(", ")),
            Duration::ZERO,
        ))
    }
}
