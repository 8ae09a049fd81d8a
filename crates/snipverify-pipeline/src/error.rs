//! Pipeline error types

use std::time::Duration;

/// Candidate source failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Upstream could not be reached
    #[error("candidate source unavailable: {0}")]
    Unavailable(String),

    /// Upstream asked us to slow down
    #[error("candidate source rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Upstream answered with something unusable
    #[error("invalid response from candidate source: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited { .. })
    }
}

/// Explanation service failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExplainError {
    #[error("explanation service unavailable: {0}")]
    Unavailable(String),

    #[error("explanation refused: {0}")]
    Refused(String),
}

/// Pipeline failures
///
/// Verification problems never show up here; they are verdicts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Query was empty or whitespace
    #[error("query must not be empty")]
    EmptyQuery,

    /// Candidates could not be fetched
    #[error(transparent)]
    Source(#[from] SourceError),
}
