//! Language registry
//!
//! Maps a [`Language`] to the [`RuntimeProfile`] and default
//! [`ResourceCeiling`] used to run it. The engine stays language-agnostic:
//! adding a language means registering a profile, nothing else.

use snipverify_core::{ExecutionSpec, Language, ResourceCeiling, RuntimeProfile};
use std::collections::HashMap;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// No profile is registered for a language
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub Language);

#[derive(Debug, Clone)]
struct Entry {
    profile: RuntimeProfile,
    ceiling: ResourceCeiling,
}

/// Language → runtime profile mapping
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    entries: HashMap<Language, Entry>,
}

impl LanguageRegistry {
    /// Empty registry
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry with the built-in profiles
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let base = ResourceCeiling::new(500, 64 * MIB, Duration::from_secs(5));

        registry.register(
            RuntimeProfile::new(
                Language::Python,
                "python:3.12-alpine",
                ["python3", "-B"],
                "snippet.py",
            ),
            base,
        );
        registry.register(
            RuntimeProfile::new(Language::JavaScript, "node:20-alpine", ["node"], "snippet.js"),
            base.with_memory_bytes(128 * MIB),
        );
        registry.register(
            RuntimeProfile::new(Language::Ruby, "ruby:3.3-alpine", ["ruby"], "snippet.rb"),
            base,
        );
        registry.register(
            RuntimeProfile::new(Language::Bash, "bash:5", ["bash"], "snippet.sh"),
            base,
        );
        registry
    }

    /// Register or replace the profile for `profile.language`
    pub fn register(&mut self, profile: RuntimeProfile, ceiling: ResourceCeiling) {
        self.entries
            .insert(profile.language.clone(), Entry { profile, ceiling });
    }

    /// Profile for a language
    ///
    /// # Errors
    /// Returns [`UnsupportedLanguage`] when nothing is registered for it
    pub fn profile(&self, language: &Language) -> Result<&RuntimeProfile, UnsupportedLanguage> {
        self.entries
            .get(language)
            .map(|e| &e.profile)
            .ok_or_else(|| UnsupportedLanguage(language.clone()))
    }

    /// Default ceiling for a language
    ///
    /// # Errors
    /// Returns [`UnsupportedLanguage`] when nothing is registered for it
    pub fn ceiling(&self, language: &Language) -> Result<ResourceCeiling, UnsupportedLanguage> {
        self.entries
            .get(language)
            .map(|e| e.ceiling)
            .ok_or_else(|| UnsupportedLanguage(language.clone()))
    }

    /// Build the execution spec for a language using its default ceiling
    ///
    /// # Errors
    /// Returns [`UnsupportedLanguage`] when nothing is registered for it
    pub fn spec_for(&self, language: &Language) -> Result<ExecutionSpec, UnsupportedLanguage> {
        let entry = self
            .entries
            .get(language)
            .ok_or_else(|| UnsupportedLanguage(language.clone()))?;
        Ok(ExecutionSpec::new(entry.profile.clone(), entry.ceiling))
    }

    /// Whether a language has a profile
    #[inline]
    #[must_use]
    pub fn supports(&self, language: &Language) -> bool {
        self.entries.contains_key(language)
    }

    /// Registered languages, sorted
    #[must_use]
    pub fn languages(&self) -> Vec<Language> {
        let mut langs: Vec<Language> = self.entries.keys().cloned().collect();
        langs.sort();
        langs
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_python_matches_sandbox_defaults() {
        let registry = LanguageRegistry::builtin();
        let spec = registry.spec_for(&Language::Python).unwrap();
        assert_eq!(spec.profile().image, "python:3.12-alpine");
        assert_eq!(spec.ceiling().memory_bytes, 64 * MIB);
        assert_eq!(spec.ceiling().cpu_millicores, 500);
        assert_eq!(spec.deadline(), Duration::from_secs(5));
    }

    #[test]
    fn unknown_language_is_rejected() {
        let registry = LanguageRegistry::builtin();
        let err = registry
            .spec_for(&Language::parse("brainfuck"))
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported language: brainfuck");
    }

    #[test]
    fn register_overrides() {
        let mut registry = LanguageRegistry::builtin();
        registry.register(
            RuntimeProfile::new(Language::Python, "custom/python", ["python3"], "main.py"),
            ResourceCeiling::default().with_wall_clock(Duration::from_secs(1)),
        );
        let spec = registry.spec_for(&Language::Python).unwrap();
        assert_eq!(spec.profile().image, "custom/python");
        assert_eq!(spec.deadline(), Duration::from_secs(1));
    }

    #[test]
    fn languages_sorted() {
        let langs = LanguageRegistry::builtin().languages();
        assert_eq!(langs.len(), 4);
        assert!(langs.windows(2).all(|w| w[0] <= w[1]));
    }
}
