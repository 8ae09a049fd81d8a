//! Verdicts and verification results

use crate::spec::duration_ms;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// Why the engine could not reach a snippet-quality verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraErrorKind {
    /// No worker slot freed up within the queuing timeout
    PoolSaturated,
    /// Sandbox could not be provisioned within the retry bound
    ProvisionFailed,
    /// Isolation layer faulted while running the snippet
    ExecutionFault,
    /// Caller cancelled the request while it was queued
    Cancelled,
    /// No runtime profile for the snippet's language
    UnsupportedLanguage,
    /// Static screen refused to run the snippet
    Rejected,
}

impl InfraErrorKind {
    /// Whether resubmitting later may produce a real verdict
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PoolSaturated | Self::ProvisionFailed | Self::ExecutionFault | Self::Cancelled
        )
    }
}

impl Display for InfraErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PoolSaturated => "pool saturated",
            Self::ProvisionFailed => "provision failed",
            Self::ExecutionFault => "execution fault",
            Self::Cancelled => "cancelled",
            Self::UnsupportedLanguage => "unsupported language",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Classified outcome of a verification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    /// Exited 0 and matched the expected output, if any
    Verified,
    /// Non-zero exit or output mismatch
    Failed,
    /// Exceeded the wall-clock deadline
    TimedOut,
    /// The engine could not tell whether the snippet works
    InfraError(InfraErrorKind),
}

impl Verdict {
    /// Short stable label, used for metrics and logs
    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::InfraError(_) => "infra_error",
        }
    }

    /// True for verdicts that describe the snippet rather than the host
    #[inline]
    #[must_use]
    pub fn is_snippet_verdict(&self) -> bool {
        !matches!(self, Self::InfraError(_))
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InfraError(kind) => write!(f, "infra_error({kind})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Output stream captured up to a byte bound
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    /// Captured text (lossy UTF-8)
    pub text: String,
    /// Whether bytes beyond the bound were discarded
    pub truncated: bool,
}

impl CapturedOutput {
    /// Capture `bytes`, keeping at most `limit` of them
    #[must_use]
    pub fn capture(bytes: &[u8], limit: usize) -> Self {
        let truncated = bytes.len() > limit;
        let kept = if truncated { &bytes[..limit] } else { bytes };
        Self {
            text: String::from_utf8_lossy(kept).into_owned(),
            truncated,
        }
    }

    /// Build from bytes already bounded by the reader
    #[must_use]
    pub fn from_bounded(bytes: &[u8], truncated: bool) -> Self {
        Self {
            text: String::from_utf8_lossy(bytes).into_owned(),
            truncated,
        }
    }

    /// Captured text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True if nothing was captured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Immutable result of verifying one snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Classified verdict
    pub verdict: Verdict,
    /// Exit code, when the snippet ran to completion
    pub exit_code: Option<i32>,
    /// Captured stdout
    pub stdout: CapturedOutput,
    /// Captured stderr
    pub stderr: CapturedOutput,
    /// Wall time attributed to the verdict (snippet run time when it ran to completion)
    #[serde(with = "duration_ms", rename = "elapsed_ms")]
    pub elapsed: Duration,
    /// Explanation of the verdict when it is not `Verified`
    pub detail: Option<String>,
}

impl VerificationResult {
    /// Snippet exited cleanly and matched expectations
    #[must_use]
    pub fn verified(
        exit_code: i32,
        stdout: CapturedOutput,
        stderr: CapturedOutput,
        elapsed: Duration,
    ) -> Self {
        Self {
            verdict: Verdict::Verified,
            exit_code: Some(exit_code),
            stdout,
            stderr,
            elapsed,
            detail: None,
        }
    }

    /// Snippet ran but failed
    #[must_use]
    pub fn failed(
        exit_code: i32,
        stdout: CapturedOutput,
        stderr: CapturedOutput,
        elapsed: Duration,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            verdict: Verdict::Failed,
            exit_code: Some(exit_code),
            stdout,
            stderr,
            elapsed,
            detail: Some(detail.into()),
        }
    }

    /// Snippet was still running when the deadline fired
    #[must_use]
    pub fn timed_out(deadline: Duration, elapsed: Duration) -> Self {
        Self {
            verdict: Verdict::TimedOut,
            exit_code: None,
            stdout: CapturedOutput::default(),
            stderr: CapturedOutput::default(),
            elapsed,
            detail: Some(format!(
                "exceeded wall-clock deadline of {}ms",
                deadline.as_millis()
            )),
        }
    }

    /// The engine failed before reaching a snippet verdict
    #[must_use]
    pub fn infra(kind: InfraErrorKind, detail: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            verdict: Verdict::InfraError(kind),
            exit_code: None,
            stdout: CapturedOutput::default(),
            stderr: CapturedOutput::default(),
            elapsed,
            detail: Some(detail.into()),
        }
    }

    /// Verdict is `Verified`
    #[inline]
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verdict == Verdict::Verified
    }

    /// Verdict is an `InfraError`
    #[inline]
    #[must_use]
    pub fn is_infra_error(&self) -> bool {
        matches!(self.verdict, Verdict::InfraError(_))
    }

    /// Infra error kind, if any
    #[inline]
    #[must_use]
    pub fn infra_kind(&self) -> Option<InfraErrorKind> {
        match self.verdict {
            Verdict::InfraError(kind) => Some(kind),
            _ => None,
        }
    }
}
