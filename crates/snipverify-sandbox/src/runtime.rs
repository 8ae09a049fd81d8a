//! Sandbox runtime adapter contract
//!
//! The verification engine talks to isolation backends only through
//! [`SandboxRuntime`]. Implementations must:
//! - keep the snippet away from the host filesystem and network
//! - enforce the [`ResourceCeiling`](snipverify_core::ResourceCeiling) themselves
//! - stop the snippet when the `execute` future is dropped
//! - make `teardown` idempotent and safe after any earlier failure

use crate::error::{ExecutionError, ProvisionError};
use async_trait::async_trait;
use snipverify_core::{CapturedOutput, ExecutionSpec, Snippet};
use std::sync::Arc;
use std::time::Duration;

/// Opaque reference to a provisioned environment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentHandle {
    id: String,
    runtime: &'static str,
}

impl EnvironmentHandle {
    /// Create new handle
    #[inline]
    #[must_use]
    pub fn new(runtime: &'static str, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            runtime,
        }
    }

    /// Backend-specific environment id (container name, scratch dir key)
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the runtime that issued the handle
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> &'static str {
        self.runtime
    }
}

impl std::fmt::Display for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.runtime, self.id)
    }
}

/// What a snippet did inside its environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Process exit code (128 + signal when killed by a signal)
    pub exit_code: i32,
    /// Captured stdout
    pub stdout: CapturedOutput,
    /// Captured stderr
    pub stderr: CapturedOutput,
    /// Time the snippet ran
    pub elapsed: Duration,
}

impl ExecutionOutcome {
    /// Exit code is zero
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Isolation backend used by the verification engine
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Short backend name for logs and handles
    fn name(&self) -> &'static str;

    /// Check whether the backend is usable on this host
    async fn is_available(&self) -> bool;

    /// Create a fresh, isolated, empty environment for `spec`
    async fn provision(&self, spec: &ExecutionSpec) -> Result<EnvironmentHandle, ProvisionError>;

    /// Run `snippet` inside the environment and wait for it to exit
    async fn execute(
        &self,
        handle: &EnvironmentHandle,
        snippet: &Snippet,
    ) -> Result<ExecutionOutcome, ExecutionError>;

    /// Destroy the environment and reclaim everything it held
    async fn teardown(&self, handle: &EnvironmentHandle);
}

/// Shared runtime handle
pub type SharedRuntime = Arc<dyn SandboxRuntime>;

#[cfg(unix)]
pub(crate) fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
pub(crate) fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
