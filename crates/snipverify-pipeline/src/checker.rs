//! Candidate checking
//!
//! Runs one snippet through prepare → static screen → engine, and iterates
//! a list of code blocks until one verifies.

use crate::prepare::prepare_source;
use crate::screen::StaticScreen;
use serde::Serialize;
use snipverify_core::{Language, Snippet, VerificationResult};
use snipverify_engine::VerificationEngine;
use std::sync::Arc;

/// Blocks with fewer non-whitespace-trimmed characters are not worth a sandbox
pub const MIN_BLOCK_CHARS: usize = 6;

/// What happened to one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BlockOutcome {
    /// Skipped without running
    TooShort,
    /// Screened and (unless rejected) executed
    Checked { result: VerificationResult },
}

/// Report entry for one examined block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriedBlock {
    /// Position in the input list
    pub index: usize,
    /// What happened to it
    #[serde(flatten)]
    pub outcome: BlockOutcome,
}

impl TriedBlock {
    /// Block ran and verified
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(&self.outcome, BlockOutcome::Checked { result } if result.is_verified())
    }
}

/// The block that verified
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedBlock {
    /// Position in the input list
    pub index: usize,
    /// Block as submitted, before preparation
    pub snippet: Snippet,
    /// Verdict for the prepared block
    pub result: VerificationResult,
}

/// Result of iterating a list of blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockReport {
    /// First block that verified, if any
    pub verified: Option<VerifiedBlock>,
    /// Every block examined, in order (stops after the first success)
    pub tried: Vec<TriedBlock>,
}

impl BlockReport {
    /// Some block verified
    #[inline]
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verified.is_some()
    }
}

/// Prepares, screens and verifies snippets
#[derive(Debug, Clone)]
pub struct SnippetChecker {
    engine: Arc<VerificationEngine>,
    screen: Option<StaticScreen>,
}

impl SnippetChecker {
    /// Checker with the built-in static screen
    #[must_use]
    pub fn new(engine: Arc<VerificationEngine>) -> Self {
        Self {
            engine,
            screen: Some(StaticScreen::builtin()),
        }
    }

    /// Replace the static screen; `None` disables screening
    #[must_use]
    pub fn with_screen(mut self, screen: Option<StaticScreen>) -> Self {
        self.screen = screen;
        self
    }

    /// Engine the checker submits to
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<VerificationEngine> {
        &self.engine
    }

    /// Snippet with its source made runnable
    #[must_use]
    pub fn prepare(snippet: &Snippet) -> Snippet {
        let source = prepare_source(snippet.source(), snippet.language());
        snippet.clone().with_source(source)
    }

    /// Prepare, screen and verify one snippet
    pub async fn check(&self, snippet: &Snippet) -> VerificationResult {
        let prepared = Self::prepare(snippet);
        if let Some(screen) = &self.screen {
            if let Err(rejected) = screen.check(&prepared) {
                return rejected;
            }
        }
        self.engine.submit_for_language(prepared).await
    }

    /// Try each block in order until one verifies
    pub async fn verify_blocks<S: AsRef<str>>(&self, blocks: &[S], language: &Language) -> BlockReport {
        let mut tried = Vec::with_capacity(blocks.len());

        for (index, block) in blocks.iter().enumerate() {
            let block = block.as_ref();
            if block.trim().chars().count() < MIN_BLOCK_CHARS {
                tracing::debug!(index, "block too short, skipped");
                tried.push(TriedBlock {
                    index,
                    outcome: BlockOutcome::TooShort,
                });
                continue;
            }

            let snippet = Snippet::new(block, language.clone());
            let result = self.check(&snippet).await;
            let verified = result.is_verified();
            tried.push(TriedBlock {
                index,
                outcome: BlockOutcome::Checked {
                    result: result.clone(),
                },
            });

            if verified {
                return BlockReport {
                    verified: Some(VerifiedBlock {
                        index,
                        snippet,
                        result,
                    }),
                    tried,
                };
            }
        }

        BlockReport {
            verified: None,
            tried,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snipverify_core::{InfraErrorKind, Verdict};
    use snipverify_engine::EngineConfig;
    use snipverify_test_utils::{shared, Script, ScriptedRuntime};

    fn checker(runtime: ScriptedRuntime) -> (Arc<ScriptedRuntime>, SnippetChecker) {
        let (scripted, dyn_runtime) = shared(runtime);
        let engine = VerificationEngine::new(dyn_runtime, EngineConfig::default()).unwrap();
        (scripted, SnippetChecker::new(Arc::new(engine)))
    }

    #[tokio::test]
    async fn first_verified_block_wins() {
        let runtime = ScriptedRuntime::with_default(Script::ok("olleh\n"))
            .on_source("1/0", Script::fail(1, "ZeroDivisionError: division by zero"));
        let (scripted, checker) = checker(runtime);
        let blocks = ["x", "print(1/0)", "s = 'hello'\nprint(s[::-1])", "print('never run')"];

        let report = checker.verify_blocks(&blocks, &Language::Python).await;

        let verified = report.verified.unwrap();
        assert_eq!(verified.index, 2);
        assert_eq!(report.tried.len(), 3);
        assert_eq!(report.tried[0].outcome, BlockOutcome::TooShort);
        assert!(!report.tried[1].is_verified());
        assert!(report.tried[2].is_verified());
        assert_eq!(scripted.execute_calls(), 2);
    }

    #[tokio::test]
    async fn no_block_verified() {
        let (_, checker) = checker(ScriptedRuntime::with_default(Script::fail(1, "boom")));
        let report = checker
            .verify_blocks(&["print(1)", "print(2)"], &Language::Python)
            .await;
        assert!(!report.is_verified());
        assert_eq!(report.tried.len(), 2);
    }

    #[tokio::test]
    async fn screened_snippet_never_reaches_the_sandbox() {
        let (scripted, checker) = checker(ScriptedRuntime::new());
        let result = checker
            .check(&Snippet::new("import os\nos.system('id')", Language::Python))
            .await;
        assert_eq!(result.verdict, Verdict::InfraError(InfraErrorKind::Rejected));
        assert_eq!(scripted.provision_calls(), 0);

        let unscreened = checker.with_screen(None);
        let result = unscreened
            .check(&Snippet::new("import os\nos.system('id')", Language::Python))
            .await;
        assert!(result.is_verified());
        assert_eq!(scripted.provision_calls(), 1);
    }

    #[tokio::test]
    async fn expression_is_wrapped_before_running() {
        let runtime = ScriptedRuntime::with_default(Script::fail(1, "unwrapped"))
            .on_source("print('abc'[::-1])", Script::ok("cba\n"));
        let (_, checker) = checker(runtime);
        let result = checker
            .check(&Snippet::new("'abc'[::-1]", Language::Python))
            .await;
        assert!(result.is_verified());
        assert_eq!(result.stdout.as_str(), "cba\n");
    }
}
