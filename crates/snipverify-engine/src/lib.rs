//! snipverify verification engine
//!
//! Decides whether an untrusted snippet runs correctly:
//! - [`VerificationEngine`]: cache lookup, bounded queuing, provisioning with
//!   retry, deadline-enforced execution, guaranteed teardown
//! - [`WorkerPool`]: fixed number of concurrent sandboxes
//! - [`EngineConfig`]: TOML configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use snipverify_engine::{EngineConfig, VerificationEngine};
//! use snipverify_core::Snippet;
//! use snipverify_sandbox::DockerRuntime;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = VerificationEngine::new(Arc::new(DockerRuntime::new()), EngineConfig::default())?;
//! let result = engine.submit_for_language(Snippet::new("print(1 + 1)", "python")).await;
//! println!("{}", result.verdict);
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]

pub mod cancel;
pub mod classify;
pub mod config;
pub mod engine;
pub mod job;
pub mod pool;

pub use cancel::CancelToken;
pub use classify::classify;
pub use config::{ConfigError, EngineConfig, LanguageOverride};
pub use engine::{EngineStats, VerificationEngine};
pub use job::{JobStatus, JobTracker, VerificationJob};
pub use pool::{AcquireError, PoolStats, WorkerPool, WorkerSlot};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
