//! Sandbox runtime adapters
//!
//! Everything the verification engine needs from an isolation backend:
//! - [`SandboxRuntime`]: provision / execute / teardown contract
//! - [`DockerRuntime`]: one locked-down container per attempt
//! - [`ProcessRuntime`]: local process backend for trusted hosts
//! - [`LanguageRegistry`]: language → image/interpreter/ceiling mapping

#![allow(missing_docs)]

pub mod capture;
pub mod docker;
pub mod error;
pub mod process;
pub mod registry;
pub mod runtime;

pub use capture::read_bounded;
pub use docker::DockerRuntime;
pub use error::{ExecutionError, ProvisionError};
pub use process::ProcessRuntime;
pub use registry::{LanguageRegistry, UnsupportedLanguage};
pub use runtime::{EnvironmentHandle, ExecutionOutcome, SandboxRuntime, SharedRuntime};
