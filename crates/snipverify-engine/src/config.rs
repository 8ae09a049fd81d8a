//! Engine configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! max_concurrent_sandboxes = 4
//! queue_timeout_ms = 5000
//! provision_attempts = 2
//! cache_ttl_secs = 600
//!
//! [languages.python]
//! image = "python:3.12-slim"
//! timeout_ms = 3000
//! ```

use serde::{Deserialize, Serialize};
use snipverify_core::{Language, ResourceCeiling, RuntimeProfile, DEFAULT_OUTPUT_LIMIT};
use snipverify_sandbox::LanguageRegistry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse into the expected shape
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A new language was declared without enough information to run it
    #[error("language {language} needs image, command and source_file")]
    IncompleteLanguage { language: String },
}

/// Per-language override of the built-in runtime profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LanguageOverride {
    /// Container image
    pub image: Option<String>,
    /// Interpreter argv; the source path is appended
    pub command: Option<Vec<String>>,
    /// File name the snippet is written to
    pub source_file: Option<String>,
    /// Memory ceiling in MiB
    pub memory_mb: Option<u64>,
    /// CPU ceiling (1000 = one core)
    pub cpu_millicores: Option<u32>,
    /// Wall-clock deadline
    pub timeout_ms: Option<u64>,
    /// Process count ceiling
    pub pids: Option<u32>,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Worker pool capacity (maximum concurrent sandboxes)
    pub max_concurrent_sandboxes: usize,
    /// How long a request may wait for a worker slot
    pub queue_timeout_ms: u64,
    /// Provision attempts before giving up (including the first)
    pub provision_attempts: u32,
    /// Base backoff between provision attempts (multiplied by attempt number)
    pub provision_backoff_ms: u64,
    /// Bound on a single provision call
    pub provision_timeout_ms: u64,
    /// Fingerprint cache capacity
    pub cache_capacity: u64,
    /// Fingerprint cache TTL
    pub cache_ttl_secs: u64,
    /// Per-stream capture bound for specs resolved from the registry
    pub output_limit_bytes: usize,
    /// Runtime profile overrides keyed by language tag
    pub languages: BTreeMap<String, LanguageOverride>,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With max concurrent sandboxes
    #[inline]
    #[must_use]
    pub fn with_max_sandboxes(mut self, max: usize) -> Self {
        self.max_concurrent_sandboxes = max;
        self
    }

    /// With queue timeout
    #[inline]
    #[must_use]
    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout_ms = duration_ms(timeout);
        self
    }

    /// With provision attempts and backoff
    #[inline]
    #[must_use]
    pub fn with_provision_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.provision_attempts = attempts;
        self.provision_backoff_ms = duration_ms(backoff);
        self
    }

    /// With provision timeout
    #[inline]
    #[must_use]
    pub fn with_provision_timeout(mut self, timeout: Duration) -> Self {
        self.provision_timeout_ms = duration_ms(timeout);
        self
    }

    /// With cache capacity and TTL (whole seconds)
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, capacity: u64, ttl: Duration) -> Self {
        self.cache_capacity = capacity;
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` for malformed TOML or unknown keys, and
    /// `ConfigError::Invalid` when a value is out of range
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// See [`from_toml_str`](Self::from_toml_str); also `ConfigError::Io`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns the first out-of-range field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_sandboxes == 0 {
            return Err(invalid("max_concurrent_sandboxes", "must be at least 1"));
        }
        if self.provision_attempts == 0 {
            return Err(invalid("provision_attempts", "must be at least 1"));
        }
        if self.provision_timeout_ms == 0 {
            return Err(invalid("provision_timeout_ms", "must be positive"));
        }
        if self.cache_capacity == 0 {
            return Err(invalid("cache_capacity", "must be at least 1"));
        }
        if self.output_limit_bytes == 0 {
            return Err(invalid("output_limit_bytes", "must be positive"));
        }
        for (name, lang) in &self.languages {
            if lang.timeout_ms == Some(0) {
                return Err(ConfigError::Invalid {
                    field: "languages.timeout_ms",
                    reason: format!("{name}: must be positive"),
                });
            }
            if lang.command.as_ref().is_some_and(Vec::is_empty) {
                return Err(ConfigError::Invalid {
                    field: "languages.command",
                    reason: format!("{name}: must not be empty"),
                });
            }
        }
        Ok(())
    }

    /// Queue timeout as a duration
    #[inline]
    #[must_use]
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    /// Provision backoff as a duration
    #[inline]
    #[must_use]
    pub fn provision_backoff(&self) -> Duration {
        Duration::from_millis(self.provision_backoff_ms)
    }

    /// Provision timeout as a duration
    #[inline]
    #[must_use]
    pub fn provision_timeout(&self) -> Duration {
        Duration::from_millis(self.provision_timeout_ms)
    }

    /// Cache TTL as a duration
    #[inline]
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Built-in registry with this config's language overrides applied
    ///
    /// # Errors
    /// Returns `ConfigError::IncompleteLanguage` when an override names a
    /// language with no built-in profile and does not fully describe one
    pub fn build_registry(&self) -> Result<LanguageRegistry, ConfigError> {
        let mut registry = LanguageRegistry::builtin();

        for (tag, patch) in &self.languages {
            let language = Language::parse(tag);
            let (mut profile, mut ceiling) = match (registry.profile(&language), registry.ceiling(&language)) {
                (Ok(profile), Ok(ceiling)) => (profile.clone(), ceiling),
                _ => match (&patch.image, &patch.command, &patch.source_file) {
                    (Some(image), Some(command), Some(source_file)) => (
                        RuntimeProfile::new(language.clone(), image.clone(), command.clone(), source_file.clone()),
                        ResourceCeiling::default(),
                    ),
                    _ => {
                        return Err(ConfigError::IncompleteLanguage {
                            language: language.to_string(),
                        })
                    }
                },
            };

            if let Some(image) = &patch.image {
                profile.image.clone_from(image);
            }
            if let Some(command) = &patch.command {
                profile.command.clone_from(command);
            }
            if let Some(source_file) = &patch.source_file {
                profile.source_file.clone_from(source_file);
            }
            if let Some(mb) = patch.memory_mb {
                ceiling.memory_bytes = mb * 1024 * 1024;
            }
            if let Some(millicores) = patch.cpu_millicores {
                ceiling.cpu_millicores = millicores;
            }
            if let Some(ms) = patch.timeout_ms {
                ceiling.wall_clock = Duration::from_millis(ms);
            }
            if let Some(pids) = patch.pids {
                ceiling.pids = pids;
            }
            registry.register(profile, ceiling);
        }

        Ok(registry)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sandboxes: 4,
            queue_timeout_ms: 5_000,
            provision_attempts: 2,
            provision_backoff_ms: 100,
            provision_timeout_ms: 30_000,
            cache_capacity: 10_000,
            cache_ttl_secs: 600,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT,
            languages: BTreeMap::new(),
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
