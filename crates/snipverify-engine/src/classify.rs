//! Outcome classification
//!
//! Turns what the sandbox reported into a verdict:
//! - non-zero exit → `Failed`, detail is the captured stderr
//! - zero exit with a mismatching expectation → `Failed`, detail is the mismatch
//! - otherwise → `Verified`

use snipverify_core::{Snippet, VerificationResult};
use snipverify_sandbox::ExecutionOutcome;

/// Exit code reported for SIGKILL (typically the memory ceiling)
const SIGKILL_EXIT: i32 = 137;

/// Classify a completed execution
#[must_use]
pub fn classify(snippet: &Snippet, outcome: ExecutionOutcome) -> VerificationResult {
    let ExecutionOutcome {
        exit_code,
        stdout,
        stderr,
        elapsed,
    } = outcome;

    if exit_code != 0 {
        let detail = failure_detail(exit_code, stderr.as_str());
        return VerificationResult::failed(exit_code, stdout, stderr, elapsed, detail);
    }

    match snippet.expected().map(|expected| expected.check(stdout.as_str())) {
        Some(Err(mismatch)) => {
            let detail = if stdout.truncated {
                format!("{mismatch} (stdout truncated)")
            } else {
                mismatch
            };
            VerificationResult::failed(exit_code, stdout, stderr, elapsed, detail)
        }
        Some(Ok(())) | None => VerificationResult::verified(exit_code, stdout, stderr, elapsed),
    }
}

fn failure_detail(exit_code: i32, stderr: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    if exit_code == SIGKILL_EXIT {
        format!("exited with code {exit_code} (killed, possibly by the memory limit)")
    } else {
        format!("exited with code {exit_code}")
    }
}
