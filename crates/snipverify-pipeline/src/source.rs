//! Collaborators consumed by the pipeline

use crate::error::{ExplainError, SourceError};
use async_trait::async_trait;
use snipverify_core::Snippet;

/// Supplies candidate snippets for a query, best first
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Fetch candidates; an empty list means nothing to verify
    async fn fetch_candidates(&self, query: &str) -> Result<Vec<Snippet>, SourceError>;
}

/// Produces a natural-language explanation of a verified snippet
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExplanationService: Send + Sync {
    async fn explain(&self, snippet: &Snippet, query: &str) -> Result<String, ExplainError>;
}

/// Fixed list of candidates, for local runs and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    candidates: Vec<Snippet>,
}

impl StaticSource {
    /// Source that returns `candidates` for every query
    #[must_use]
    pub fn new(candidates: Vec<Snippet>) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl CandidateSource for StaticSource {
    async fn fetch_candidates(&self, _query: &str) -> Result<Vec<Snippet>, SourceError> {
        Ok(self.candidates.clone())
    }
}

/// Explanation service that is never available
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExplanation;

#[async_trait]
impl ExplanationService for NoExplanation {
    async fn explain(&self, _snippet: &Snippet, _query: &str) -> Result<String, ExplainError> {
        Err(ExplainError::Unavailable("no explanation service configured".into()))
    }
}
