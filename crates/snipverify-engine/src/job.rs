//! Verification jobs and their lifecycle
//!
//! ```text
//! Queued → Provisioning → Running → Completed
//!                │           ├────→ TimedOut
//!                └───────────┴────→ InfraError
//! ```
//!
//! Every non-terminal state reaches a terminal one: provisioning is bounded
//! by the retry policy and running is bounded by the deadline.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use snipverify_core::{ExecutionSpec, Fingerprint, JobId, Snippet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker slot
    Queued,
    /// Slot held; creating the sandbox
    Provisioning,
    /// Snippet executing
    Running,
    /// Ran to completion and was classified
    Completed,
    /// Deadline fired; sandbox forcibly torn down
    TimedOut,
    /// Engine failed before a snippet verdict
    InfraError,
}

impl JobStatus {
    /// No further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::InfraError)
    }

    /// Whether `next` is a legal successor
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use JobStatus::{Completed, InfraError, Provisioning, Queued, Running, TimedOut};
        matches!(
            (self, next),
            (Queued, Provisioning | InfraError)
                | (Provisioning, Running | InfraError)
                | (Running, Completed | TimedOut | InfraError)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::InfraError => "infra_error",
        };
        f.write_str(s)
    }
}

/// Live view of every in-flight job
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: DashMap<JobId, JobStatus>,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

impl JobTracker {
    /// Create empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, id: JobId, status: JobStatus) {
        self.jobs.insert(id, status);
    }

    fn transition(&self, id: JobId, from: JobStatus, to: JobStatus) {
        if let Some(mut entry) = self.jobs.get_mut(&id) {
            *entry = to;
        }
        if to == JobStatus::Running && from != JobStatus::Running {
            let now = self.running.fetch_add(1, Ordering::AcqRel) + 1;
            self.peak_running.fetch_max(now, Ordering::AcqRel);
        } else if from == JobStatus::Running && to != JobStatus::Running {
            self.running.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn remove(&self, id: JobId) {
        if let Some((_, status)) = self.jobs.remove(&id) {
            if status == JobStatus::Running {
                self.running.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }

    /// Status of an in-flight job
    #[must_use]
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.jobs.get(&id).map(|s| *s)
    }

    /// Jobs currently tracked
    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }

    /// Jobs waiting for a slot
    #[must_use]
    pub fn queued(&self) -> usize {
        self.jobs.iter().filter(|e| *e.value() == JobStatus::Queued).count()
    }

    /// Jobs currently executing
    #[inline]
    #[must_use]
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Highest number of simultaneously executing jobs observed
    #[inline]
    #[must_use]
    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::Acquire)
    }

    /// Snapshot of (job, status) pairs
    #[must_use]
    pub fn snapshot(&self) -> Vec<(JobId, JobStatus)> {
        self.jobs.iter().map(|e| (*e.key(), *e.value())).collect()
    }
}

/// One attempt to verify a snippet under a spec
///
/// Owned by the engine for the duration of the attempt; removed from the
/// tracker when dropped.
#[derive(Debug)]
pub struct VerificationJob {
    id: JobId,
    fingerprint: Fingerprint,
    snippet: Arc<Snippet>,
    spec: ExecutionSpec,
    status: JobStatus,
    created_at: Instant,
    tracker: Arc<JobTracker>,
}

impl VerificationJob {
    /// Create a queued job and register it with `tracker`
    #[must_use]
    pub fn queued(
        snippet: Arc<Snippet>,
        spec: ExecutionSpec,
        fingerprint: Fingerprint,
        tracker: Arc<JobTracker>,
    ) -> Self {
        let id = JobId::new();
        tracker.insert(id, JobStatus::Queued);
        Self {
            id,
            fingerprint,
            snippet,
            spec,
            status: JobStatus::Queued,
            created_at: Instant::now(),
            tracker,
        }
    }

    /// Move to `next`
    pub fn advance(&mut self, next: JobStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal job transition {} -> {next}",
            self.status
        );
        tracing::trace!(job = %self.id, from = %self.status, to = %next, "job transition");
        self.tracker.transition(self.id, self.status, next);
        self.status = next;
    }

    /// Job identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Cache key the verdict is stored under
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Snippet being verified, in runnable form
    #[inline]
    #[must_use]
    pub fn snippet(&self) -> &Snippet {
        &self.snippet
    }

    /// Execution spec the job runs under
    #[inline]
    #[must_use]
    pub fn spec(&self) -> &ExecutionSpec {
        &self.spec
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Time since the job was queued
    #[inline]
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

impl Drop for VerificationJob {
    fn drop(&mut self) {
        self.tracker.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snipverify_core::{Language, ResourceCeiling, RuntimeProfile};

    fn job(tracker: &Arc<JobTracker>) -> VerificationJob {
        let snippet = Arc::new(Snippet::new("print(1)", "python"));
        let spec = ExecutionSpec::new(
            RuntimeProfile::new(Language::Python, "img", ["python3"], "s.py"),
            ResourceCeiling::default(),
        );
        let fp = Fingerprint::compute(&snippet, &spec);
        VerificationJob::queued(snippet, spec, fp, Arc::clone(tracker))
    }

    #[test]
    fn legal_transitions() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Provisioning));
        assert!(Queued.can_transition_to(InfraError));
        assert!(Provisioning.can_transition_to(Running));
        assert!(Running.can_transition_to(TimedOut));
        assert!(!Queued.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Provisioning.can_transition_to(TimedOut));
        assert!(TimedOut.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn tracker_follows_job_lifecycle() {
        let tracker = Arc::new(JobTracker::new());
        let mut a = job(&tracker);
        let mut b = job(&tracker);
        assert_eq!(tracker.queued(), 2);

        a.advance(JobStatus::Provisioning);
        a.advance(JobStatus::Running);
        b.advance(JobStatus::Provisioning);
        b.advance(JobStatus::Running);
        assert_eq!(tracker.running(), 2);
        assert_eq!(tracker.status(a.id()), Some(JobStatus::Running));

        a.advance(JobStatus::Completed);
        assert_eq!(tracker.running(), 1);
        drop(a);
        assert_eq!(tracker.in_flight(), 1);

        // Dropped mid-run still releases the running gauge
        drop(b);
        assert_eq!(tracker.running(), 0);
        assert_eq!(tracker.peak_running(), 2);
        assert_eq!(tracker.in_flight(), 0);
    }
}
