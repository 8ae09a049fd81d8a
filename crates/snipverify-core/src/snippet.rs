//! Candidate snippets
//!
//! A [`Snippet`] is immutable once built. The builder-style `with_*`
//! methods consume the value, so a snippet can only be shaped before it is
//! handed out (typically wrapped in an `Arc`).

use crate::ids::SnippetId;
use crate::language::Language;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Where a candidate came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Query that produced the candidate
    pub query: Option<String>,
    /// Rank assigned by the candidate source (0 = best)
    pub rank: Option<usize>,
    /// Opaque reference back into the source (URL, answer id, ...)
    pub source_ref: Option<String>,
}

impl Origin {
    /// Origin for a ranked query result
    #[inline]
    #[must_use]
    pub fn ranked(query: impl Into<String>, rank: usize) -> Self {
        Self {
            query: Some(query.into()),
            rank: Some(rank),
            source_ref: None,
        }
    }

    /// Attach a source reference
    #[inline]
    #[must_use]
    pub fn with_source_ref(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }
}

/// Optional check applied to a snippet's stdout after a clean exit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExpectedOutput {
    /// Whole stdout equals the value (trailing whitespace ignored on both sides)
    Exact(String),
    /// Stdout contains the value
    Contains(String),
    /// Stdout matches the regular expression
    Regex(String),
}

impl ExpectedOutput {
    /// Check stdout against the expectation
    ///
    /// # Errors
    /// Returns a human-readable mismatch description, used as the verdict
    /// detail when the snippet is marked failed.
    pub fn check(&self, stdout: &str) -> Result<(), String> {
        match self {
            Self::Exact(expected) => {
                if stdout.trim_end() == expected.trim_end() {
                    Ok(())
                } else {
                    Err(format!(
                        "output mismatch: expected {:?}, got {:?}",
                        expected.trim_end(),
                        stdout.trim_end()
                    ))
                }
            }
            Self::Contains(needle) => {
                if stdout.contains(needle.as_str()) {
                    Ok(())
                } else {
                    Err(format!("output mismatch: expected output to contain {needle:?}"))
                }
            }
            Self::Regex(pattern) => {
                let re = Regex::new(pattern)
                    .map_err(|e| format!("invalid expected-output pattern {pattern:?}: {e}"))?;
                if re.is_match(stdout) {
                    Ok(())
                } else {
                    Err(format!("output mismatch: expected output to match /{pattern}/"))
                }
            }
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::Exact(_) => "exact",
            Self::Contains(_) => "contains",
            Self::Regex(_) => "regex",
        }
    }

    fn value(&self) -> &str {
        match self {
            Self::Exact(v) | Self::Contains(v) | Self::Regex(v) => v,
        }
    }

    /// Canonical `(kind, value)` pair fed into the fingerprint
    #[inline]
    #[must_use]
    pub fn canonical(&self) -> (&'static str, &str) {
        (self.tag(), self.value())
    }
}

/// An untrusted code snippet awaiting verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    id: SnippetId,
    source: String,
    language: Language,
    expected: Option<ExpectedOutput>,
    origin: Origin,
}

impl Snippet {
    /// Create a snippet with a fresh id and no origin metadata
    #[must_use]
    pub fn new(source: impl Into<String>, language: impl Into<Language>) -> Self {
        Self {
            id: SnippetId::new(),
            source: source.into(),
            language: language.into(),
            expected: None,
            origin: Origin::default(),
        }
    }

    /// Attach an expected-output check
    #[inline]
    #[must_use]
    pub fn with_expected(mut self, expected: ExpectedOutput) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Attach origin metadata
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Replace the source text, keeping id, language and metadata
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Snippet id
    #[inline]
    #[must_use]
    pub fn id(&self) -> SnippetId {
        self.id
    }

    /// Raw source text
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Declared language
    #[inline]
    #[must_use]
    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Expected-output check, if any
    #[inline]
    #[must_use]
    pub fn expected(&self) -> Option<&ExpectedOutput> {
        self.expected.as_ref()
    }

    /// Origin metadata
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Source text in normalized form (see [`normalize_source`])
    #[inline]
    #[must_use]
    pub fn normalized_source(&self) -> String {
        normalize_source(&self.source)
    }
}

/// Normalize snippet text for fingerprinting and execution
///
/// CRLF and lone CR become LF, whitespace-only lines at the end are dropped
/// and the text ends in exactly one newline. Everything inside the program
/// is kept byte for byte, trailing spaces included, since they can sit in a
/// string literal, a heredoc or after a line continuation.
#[must_use]
pub fn normalize_source(source: &str) -> String {
    let unified = source.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = unified.split('\n').collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return String::new();
    }
    let mut normalized = lines.join("\n");
    normalized.push('\n');
    normalized
}
