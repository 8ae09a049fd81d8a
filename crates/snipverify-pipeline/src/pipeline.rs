//! Query pipeline: candidate source → verification → explanation

use crate::checker::SnippetChecker;
use crate::error::PipelineError;
use crate::screen::StaticScreen;
use crate::source::{CandidateSource, ExplanationService};
use serde::{Deserialize, Serialize};
use snipverify_core::{Snippet, VerificationResult};
use snipverify_engine::VerificationEngine;
use std::sync::Arc;

/// When to stop iterating candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Stop at the first verified candidate
    #[default]
    FirstVerified,
    /// Verify every candidate considered
    AllVerified,
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Candidates considered per query
    pub max_candidates: usize,
    /// When to stop iterating
    pub mode: PipelineMode,
    /// Run the static screen before submission
    pub static_screen: bool,
}

impl PipelineConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consider at most `max` candidates
    #[inline]
    #[must_use]
    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    /// Set the stop condition
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable the static screen
    #[inline]
    #[must_use]
    pub fn with_static_screen(mut self, enabled: bool) -> Self {
        self.static_screen = enabled;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_candidates: 5,
            mode: PipelineMode::FirstVerified,
            static_screen: true,
        }
    }
}

/// Explanation attached to a verified answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Explanation {
    /// Text from the explanation service
    Provided(String),
    /// The service failed; carries the reason
    Unavailable(String),
}

/// A candidate that verified
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedAnswer {
    /// Position in the candidate list
    pub rank: usize,
    /// Candidate as fetched
    pub snippet: Snippet,
    /// Verification verdict
    pub result: VerificationResult,
    /// Explanation, or why there is none
    pub explanation: Explanation,
}

/// A candidate that did not verify
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateReport {
    /// Position in the candidate list
    pub rank: usize,
    /// Candidate as fetched
    pub snippet: Snippet,
    /// Why it did not verify
    pub result: VerificationResult,
}

/// Everything a query produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    /// Query as received
    pub query: String,
    /// Verified candidates, best first
    pub answers: Vec<VerifiedAnswer>,
    /// Candidates that failed, timed out or were refused
    pub rejected: Vec<CandidateReport>,
}

impl PipelineOutcome {
    /// Highest-ranked verified answer
    #[must_use]
    pub fn best(&self) -> Option<&VerifiedAnswer> {
        self.answers.first()
    }

    /// At least one candidate verified
    #[inline]
    #[must_use]
    pub fn is_verified(&self) -> bool {
        !self.answers.is_empty()
    }

    /// Candidates examined
    #[must_use]
    pub fn considered(&self) -> usize {
        self.answers.len() + self.rejected.len()
    }
}

/// Wires a candidate source and an explanation service around the engine
pub struct QueryPipeline {
    checker: SnippetChecker,
    source: Arc<dyn CandidateSource>,
    explainer: Arc<dyn ExplanationService>,
    config: PipelineConfig,
}

impl QueryPipeline {
    /// Create pipeline
    #[must_use]
    pub fn new(
        engine: Arc<VerificationEngine>,
        source: Arc<dyn CandidateSource>,
        explainer: Arc<dyn ExplanationService>,
        config: PipelineConfig,
    ) -> Self {
        let screen = config.static_screen.then(StaticScreen::builtin);
        Self {
            checker: SnippetChecker::new(engine).with_screen(screen),
            source,
            explainer,
            config,
        }
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Checker candidates go through
    #[inline]
    #[must_use]
    pub fn checker(&self) -> &SnippetChecker {
        &self.checker
    }

    /// Answer `query` with verified snippets
    ///
    /// # Errors
    /// - `PipelineError::EmptyQuery` for a blank query
    /// - `PipelineError::Source` when candidates cannot be fetched
    #[tracing::instrument(skip(self), fields(mode = ?self.config.mode))]
    pub async fn run(&self, query: &str) -> Result<PipelineOutcome, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let candidates = self.source.fetch_candidates(query).await.map_err(|err| {
            tracing::warn!(error = %err, "candidate source failed");
            PipelineError::Source(err)
        })?;
        tracing::info!(candidates = candidates.len(), "candidates fetched");

        let mut outcome = PipelineOutcome {
            query: query.to_string(),
            answers: Vec::new(),
            rejected: Vec::new(),
        };

        for (rank, snippet) in candidates.into_iter().take(self.config.max_candidates).enumerate() {
            let result = self.checker.check(&snippet).await;
            if !result.is_verified() {
                tracing::debug!(rank, verdict = %result.verdict, "candidate not verified");
                outcome.rejected.push(CandidateReport { rank, snippet, result });
                continue;
            }

            let explanation = match self.explainer.explain(&snippet, query).await {
                Ok(text) => Explanation::Provided(text),
                Err(err) => {
                    tracing::warn!(rank, error = %err, "explanation failed");
                    Explanation::Unavailable(err.to_string())
                }
            };
            outcome.answers.push(VerifiedAnswer {
                rank,
                snippet,
                result,
                explanation,
            });

            if self.config.mode == PipelineMode::FirstVerified {
                break;
            }
        }

        if outcome.answers.is_empty() {
            tracing::info!(considered = outcome.considered(), "no verified snippet found");
        }
        Ok(outcome)
    }
}
