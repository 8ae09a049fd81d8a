//! Snippet languages
//!
//! A [`Language`] is only a key. How a language is actually run (image,
//! interpreter, file name) lives in a [`RuntimeProfile`](crate::RuntimeProfile)
//! resolved through the sandbox crate's language registry.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Declared language of a snippet
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Language {
    /// Python 3
    Python,
    /// JavaScript (Node.js)
    JavaScript,
    /// Ruby
    Ruby,
    /// Bash / POSIX shell
    Bash,
    /// Any other language tag, lowercased
    Other(String),
}

impl Language {
    /// Parse a language tag, accepting the usual aliases
    ///
    /// Never fails: unknown tags become [`Language::Other`] and are rejected
    /// later by the registry if no profile exists for them.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_lowercase();
        match tag.as_str() {
            "python" | "python3" | "py" | "py3" => Self::Python,
            "javascript" | "js" | "node" | "nodejs" => Self::JavaScript,
            "ruby" | "rb" => Self::Ruby,
            "bash" | "sh" | "shell" => Self::Bash,
            _ => Self::Other(tag),
        }
    }

    /// Canonical lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Ruby => "ruby",
            Self::Bash => "bash",
            Self::Other(name) => name,
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for Language {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for Language {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve() {
        assert_eq!(Language::parse("py"), Language::Python);
        assert_eq!(Language::parse(" Python3 "), Language::Python);
        assert_eq!(Language::parse("node"), Language::JavaScript);
        assert_eq!(Language::parse("sh"), Language::Bash);
        assert_eq!(Language::parse("rb"), Language::Ruby);
    }

    #[test]
    fn unknown_tag_is_kept_lowercase() {
        let lang = Language::parse("COBOL");
        assert_eq!(lang, Language::Other("cobol".to_string()));
        assert_eq!(lang.to_string(), "cobol");
    }

    #[test]
    fn serde_uses_plain_string() {
        let json = serde_json::to_string(&Language::JavaScript).unwrap();
        assert_eq!(json, "\"javascript\"");
        let back: Language = serde_json::from_str("\"js\"").unwrap();
        assert_eq!(back, Language::JavaScript);
    }
}
