//! Execution constraints for a single verification attempt
//!
//! An [`ExecutionSpec`] pairs a [`RuntimeProfile`] (how to run the language)
//! with a [`ResourceCeiling`] and the fixed isolation policies. It is built
//! once per submission and never mutated afterwards.

use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound for each captured stream (64 KiB)
pub const DEFAULT_OUTPUT_LIMIT: usize = 64 * 1024;

/// Resource ceiling for one sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceCeiling {
    /// CPU share in millicores (1000 = one full core)
    pub cpu_millicores: u32,
    /// Memory limit in bytes
    pub memory_bytes: u64,
    /// Wall-clock deadline for the execution phase
    #[serde(with = "duration_ms")]
    pub wall_clock: Duration,
    /// Maximum number of processes/threads
    pub pids: u32,
}

impl ResourceCeiling {
    /// Create new ceiling
    #[inline]
    #[must_use]
    pub fn new(cpu_millicores: u32, memory_bytes: u64, wall_clock: Duration) -> Self {
        Self {
            cpu_millicores,
            memory_bytes,
            wall_clock,
            pids: 64,
        }
    }

    /// With a different wall-clock deadline
    #[inline]
    #[must_use]
    pub fn with_wall_clock(mut self, wall_clock: Duration) -> Self {
        self.wall_clock = wall_clock;
        self
    }

    /// With a different memory limit
    #[inline]
    #[must_use]
    pub fn with_memory_bytes(mut self, memory_bytes: u64) -> Self {
        self.memory_bytes = memory_bytes;
        self
    }

    /// CPU share as fractional cores (docker `--cpus`)
    #[inline]
    #[must_use]
    pub fn cpus(&self) -> f64 {
        f64::from(self.cpu_millicores) / 1000.0
    }
}

impl Default for ResourceCeiling {
    /// Half a core, 64 MiB, 5 seconds
    fn default() -> Self {
        Self::new(500, 64 * 1024 * 1024, Duration::from_secs(5))
    }
}

/// Network policy. Sandboxes never get network access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    /// No network interfaces besides loopback
    #[default]
    Disabled,
}

/// Filesystem policy. Everything written is discarded on teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilesystemPolicy {
    /// Fresh scratch space, removed on exit
    #[default]
    Ephemeral,
}

/// How to run one language inside a sandbox
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeProfile {
    /// Language this profile runs
    pub language: Language,
    /// Container image (ignored by process-level runtimes)
    pub image: String,
    /// Interpreter argv; the source file path is appended
    pub command: Vec<String>,
    /// File name the snippet is written to
    pub source_file: String,
}

impl RuntimeProfile {
    /// Create new profile
    #[must_use]
    pub fn new(
        language: Language,
        image: impl Into<String>,
        command: impl IntoIterator<Item = impl Into<String>>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            language,
            image: image.into(),
            command: command.into_iter().map(Into::into).collect(),
            source_file: source_file.into(),
        }
    }

    /// Full argv for running `source_path`
    #[must_use]
    pub fn argv(&self, source_path: &str) -> Vec<String> {
        let mut argv = self.command.clone();
        argv.push(source_path.to_string());
        argv
    }
}

/// Immutable execution constraints for one verification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionSpec {
    profile: RuntimeProfile,
    ceiling: ResourceCeiling,
    network: NetworkPolicy,
    filesystem: FilesystemPolicy,
    output_limit: usize,
}

impl ExecutionSpec {
    /// Create spec from a runtime profile and a ceiling
    #[must_use]
    pub fn new(profile: RuntimeProfile, ceiling: ResourceCeiling) -> Self {
        Self {
            profile,
            ceiling,
            network: NetworkPolicy::Disabled,
            filesystem: FilesystemPolicy::Ephemeral,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    /// With a different per-stream output bound
    #[inline]
    #[must_use]
    pub fn with_output_limit(mut self, output_limit: usize) -> Self {
        self.output_limit = output_limit;
        self
    }

    /// With a different wall-clock deadline
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.ceiling.wall_clock = deadline;
        self
    }

    /// Runtime profile
    #[inline]
    #[must_use]
    pub fn profile(&self) -> &RuntimeProfile {
        &self.profile
    }

    /// Language the spec was resolved for
    #[inline]
    #[must_use]
    pub fn language(&self) -> &Language {
        &self.profile.language
    }

    /// Resource ceiling
    #[inline]
    #[must_use]
    pub fn ceiling(&self) -> &ResourceCeiling {
        &self.ceiling
    }

    /// Wall-clock deadline
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.ceiling.wall_clock
    }

    /// Network policy
    #[inline]
    #[must_use]
    pub fn network(&self) -> NetworkPolicy {
        self.network
    }

    /// Filesystem policy
    #[inline]
    #[must_use]
    pub fn filesystem(&self) -> FilesystemPolicy {
        self.filesystem
    }

    /// Bound applied to each captured stream
    #[inline]
    #[must_use]
    pub fn output_limit(&self) -> usize {
        self.output_limit
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python() -> RuntimeProfile {
        RuntimeProfile::new(
            Language::Python,
            "python:3.12-alpine",
            ["python3", "-B"],
            "snippet.py",
        )
    }

    #[test]
    fn argv_appends_source_path() {
        assert_eq!(
            python().argv("/sandbox/snippet.py"),
            vec!["python3", "-B", "/sandbox/snippet.py"]
        );
    }

    #[test]
    fn policies_are_fixed() {
        let spec = ExecutionSpec::new(python(), ResourceCeiling::default());
        assert_eq!(spec.network(), NetworkPolicy::Disabled);
        assert_eq!(spec.filesystem(), FilesystemPolicy::Ephemeral);
        assert_eq!(spec.output_limit(), DEFAULT_OUTPUT_LIMIT);
    }

    #[test]
    fn deadline_override() {
        let spec = ExecutionSpec::new(python(), ResourceCeiling::default())
            .with_deadline(Duration::from_millis(250));
        assert_eq!(spec.deadline(), Duration::from_millis(250));
        assert_eq!(spec.ceiling().memory_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn ceiling_serializes_millis() {
        let json = serde_json::to_value(ResourceCeiling::default()).unwrap();
        assert_eq!(json["wall_clock"], 5000);
        assert!((ResourceCeiling::default().cpus() - 0.5).abs() < f64::EPSILON);
    }
}
