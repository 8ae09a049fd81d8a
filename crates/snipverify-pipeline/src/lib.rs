//! snipverify query pipeline
//!
//! Turns a question into verified code:
//! - [`CandidateSource`] supplies candidate snippets
//! - [`SnippetChecker`] prepares, screens and verifies each one
//! - [`ExplanationService`] explains the ones that verified
//! - [`extract_code_blocks`] pulls code out of answer HTML
//! - [`HealthState`] tracks backend availability for status displays

#![allow(missing_docs)]

pub mod checker;
pub mod error;
pub mod extract;
pub mod health;
pub mod pipeline;
pub mod prepare;
pub mod screen;
pub mod source;

pub use checker::{BlockOutcome, BlockReport, SnippetChecker, TriedBlock, VerifiedBlock, MIN_BLOCK_CHARS};
pub use error::{ExplainError, PipelineError, SourceError};
pub use extract::extract_code_blocks;
pub use health::{HealthCell, HealthCheck, HealthState, HealthStatus, RuntimeCheck};
pub use pipeline::{
    CandidateReport, Explanation, PipelineConfig, PipelineMode, PipelineOutcome, QueryPipeline,
    VerifiedAnswer,
};
pub use prepare::prepare_source;
pub use screen::StaticScreen;
pub use source::{CandidateSource, ExplanationService, NoExplanation, StaticSource};
