//! snipverify core types
//!
//! Shared vocabulary for every other crate in the workspace:
//! - [`Snippet`]: immutable untrusted source text plus metadata
//! - [`ExecutionSpec`]: resource ceiling and isolation policy for one run
//! - [`VerificationResult`] / [`Verdict`]: what a verification concluded
//! - [`Fingerprint`]: cache key over (snippet, language, spec)
//!
//! # Example
//!
//! ```rust
//! use snipverify_core::{ExecutionSpec, Fingerprint, Language, ResourceCeiling, RuntimeProfile, Snippet};
//!
//! let profile = RuntimeProfile::new(Language::Python, "python:3.12-alpine", ["python3", "-B"], "snippet.py");
//! let spec = ExecutionSpec::new(profile, ResourceCeiling::default());
//! let snippet = Snippet::new("print('hi')", "py");
//!
//! let fp = Fingerprint::compute(&snippet, &spec);
//! assert_eq!(fp, Fingerprint::compute(&Snippet::new("print('hi')\n", "python"), &spec));
//! ```

#![allow(missing_docs)]

pub mod fingerprint;
pub mod ids;
pub mod language;
pub mod result;
pub mod snippet;
pub mod spec;

pub use fingerprint::{Fingerprint, FingerprintError};
pub use ids::{JobId, SnippetId};
pub use language::Language;
pub use result::{CapturedOutput, InfraErrorKind, Verdict, VerificationResult};
pub use snippet::{normalize_source, ExpectedOutput, Origin, Snippet};
pub use spec::{
    ExecutionSpec, FilesystemPolicy, NetworkPolicy, ResourceCeiling, RuntimeProfile,
    DEFAULT_OUTPUT_LIMIT,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
