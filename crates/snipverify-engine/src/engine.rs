//! Verification engine
//!
//! Cache-first pipeline for one snippet:
//! 1. Fingerprint the (snippet, spec) pair and consult the cache
//! 2. On a miss, queue for a worker slot (bounded by the queuing timeout)
//! 3. Provision a sandbox, retrying transient failures with backoff
//! 4. Execute under the spec's wall-clock deadline
//! 5. Tear the sandbox down exactly once, then release the slot
//! 6. Classify, cache snippet verdicts, return
//!
//! Steps 3–6 run on a spawned task so that a caller dropping its future
//! never skips teardown or leaves a sandbox holding a slot.

use crate::cancel::CancelToken;
use crate::classify::classify;
use crate::config::{ConfigError, EngineConfig};
use crate::job::{JobStatus, JobTracker, VerificationJob};
use crate::pool::{AcquireError, PoolStats, WorkerPool, WorkerSlot};
use snipverify_cache::FingerprintCache;
use snipverify_core::{
    ExecutionSpec, Fingerprint, InfraErrorKind, Language, Snippet, Verdict, VerificationResult,
};
use snipverify_sandbox::{
    EnvironmentHandle, LanguageRegistry, ProvisionError, SharedRuntime, UnsupportedLanguage,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

/// Engine statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Requests received
    pub submitted: u64,
    /// Requests answered from the cache
    pub cache_hits: u64,
    /// Jobs that reached provisioning
    pub executions: u64,
    /// Provision attempts that were retried
    pub provision_retries: u64,
    /// Requests waiting for a slot right now
    pub queued: usize,
    /// Jobs executing right now
    pub running: usize,
    /// Highest concurrent executions observed
    pub peak_running: usize,
    /// Results returned as `Verified`
    pub verified: u64,
    /// Results returned as `Failed`
    pub failed: u64,
    /// Results returned as `TimedOut`
    pub timed_out: u64,
    /// Results returned as any `InfraError`
    pub infra_errors: u64,
    /// Worker pool occupancy
    pub pool: PoolStats,
    /// Approximate cache size
    pub cache_entries: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    cache_hits: AtomicU64,
    executions: AtomicU64,
    provision_retries: AtomicU64,
    verified: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    infra_errors: AtomicU64,
}

impl Counters {
    fn record(&self, verdict: Verdict) {
        let counter = match verdict {
            Verdict::Verified => &self.verified,
            Verdict::Failed => &self.failed,
            Verdict::TimedOut => &self.timed_out,
            Verdict::InfraError(_) => &self.infra_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("snipverify_verdicts_total", "verdict" => verdict.label()).increment(1);
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
    provision_timeout: Duration,
}

impl RetryPolicy {
    fn from_config(config: &EngineConfig) -> Self {
        Self {
            attempts: config.provision_attempts.max(1),
            backoff: config.provision_backoff(),
            provision_timeout: config.provision_timeout(),
        }
    }

    /// Linear backoff: `backoff × attempt`
    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Everything a spawned job needs; cheap to clone
#[derive(Clone)]
struct JobRunner {
    runtime: SharedRuntime,
    cache: FingerprintCache,
    retry: RetryPolicy,
    counters: Arc<Counters>,
}

impl JobRunner {
    async fn run(self, mut job: VerificationJob, slot: WorkerSlot) -> VerificationResult {
        let started = Instant::now();
        job.advance(JobStatus::Provisioning);
        self.counters.executions.fetch_add(1, Ordering::Relaxed);

        let handle = match self.provision(&job).await {
            Ok(handle) => handle,
            Err(detail) => {
                job.advance(JobStatus::InfraError);
                drop(slot);
                return VerificationResult::infra(
                    InfraErrorKind::ProvisionFailed,
                    detail,
                    started.elapsed(),
                );
            }
        };

        job.advance(JobStatus::Running);
        let deadline = job.spec().deadline();
        let running_since = Instant::now();
        let executed =
            tokio::time::timeout(deadline, self.runtime.execute(&handle, job.snippet())).await;
        let ran_for = running_since.elapsed();

        // Runs on every path once provisioned; a timed-out execute future has
        // already been dropped, so this is the forced teardown.
        self.runtime.teardown(&handle).await;
        drop(slot);

        let (status, result) = match executed {
            Err(_deadline) => {
                tracing::warn!(
                    env = %handle,
                    deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    "deadline exceeded, sandbox torn down"
                );
                (JobStatus::TimedOut, VerificationResult::timed_out(deadline, ran_for))
            }
            Ok(Err(err)) => {
                tracing::error!(env = %handle, error = %err, "sandbox fault during execution");
                (
                    JobStatus::InfraError,
                    VerificationResult::infra(InfraErrorKind::ExecutionFault, err.to_string(), ran_for),
                )
            }
            Ok(Ok(outcome)) => (JobStatus::Completed, classify(job.snippet(), outcome)),
        };
        job.advance(status);

        if result.verdict.is_snippet_verdict() {
            self.cache.put_default(job.fingerprint(), result.clone()).await;
        }
        tracing::debug!(
            job = %job.id(),
            verdict = %result.verdict,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "job finished"
        );
        result
    }

    async fn provision(&self, job: &VerificationJob) -> Result<EnvironmentHandle, String> {
        let mut attempt = 1;
        loop {
            let err = match tokio::time::timeout(
                self.retry.provision_timeout,
                self.runtime.provision(job.spec()),
            )
            .await
            {
                Ok(Ok(handle)) => {
                    tracing::debug!(job = %job.id(), attempt, env = %handle, "sandbox provisioned");
                    return Ok(handle);
                }
                Ok(Err(err)) => err,
                Err(_) => ProvisionError::Unavailable(format!(
                    "no response within {}ms",
                    self.retry.provision_timeout.as_millis()
                )),
            };

            if !err.is_retryable() || attempt >= self.retry.attempts {
                tracing::warn!(job = %job.id(), attempt, error = %err, "provisioning failed");
                return Err(format!("provisioning failed after {attempt} attempt(s): {err}"));
            }

            tracing::warn!(job = %job.id(), attempt, error = %err, "provision attempt failed, retrying");
            self.counters.provision_retries.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("snipverify_provision_retries_total").increment(1);
            tokio::time::sleep(self.retry.delay_after(attempt)).await;
            attempt += 1;
        }
    }
}

/// Snippet with its source in normalized form
fn runnable(snippet: Arc<Snippet>) -> Arc<Snippet> {
    let normalized = snippet.normalized_source();
    if normalized == snippet.source() {
        snippet
    } else {
        Arc::new(snippet.as_ref().clone().with_source(normalized))
    }
}

/// Sandboxed snippet verification with a fingerprint cache in front
pub struct VerificationEngine {
    config: EngineConfig,
    registry: LanguageRegistry,
    pool: WorkerPool,
    jobs: Arc<JobTracker>,
    runner: JobRunner,
}

impl std::fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("runtime", &self.runner.runtime.name())
            .field("pool", &self.pool.stats())
            .field("cache", &self.runner.cache)
            .finish_non_exhaustive()
    }
}

impl VerificationEngine {
    /// Create engine over `runtime`
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration is out of range or a
    /// language override is incomplete
    pub fn new(runtime: SharedRuntime, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = config.build_registry()?;
        let cache = FingerprintCache::new(config.cache_capacity, config.cache_ttl());

        tracing::info!(
            runtime = runtime.name(),
            max_sandboxes = config.max_concurrent_sandboxes,
            cache_capacity = config.cache_capacity,
            "verification engine ready"
        );

        Ok(Self {
            pool: WorkerPool::new(config.max_concurrent_sandboxes),
            jobs: Arc::new(JobTracker::new()),
            runner: JobRunner {
                runtime,
                cache,
                retry: RetryPolicy::from_config(&config),
                counters: Arc::new(Counters::default()),
            },
            registry,
            config,
        })
    }

    /// Use `cache` instead of the one built from the config
    #[must_use]
    pub fn with_cache(mut self, cache: FingerprintCache) -> Self {
        self.runner.cache = cache;
        self
    }

    /// Use `registry` instead of the one built from the config
    #[must_use]
    pub fn with_registry(mut self, registry: LanguageRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Cache key for a (snippet, spec) pair
    #[inline]
    #[must_use]
    pub fn fingerprint(snippet: &Snippet, spec: &ExecutionSpec) -> Fingerprint {
        Fingerprint::compute(snippet, spec)
    }

    /// Verify `snippet` under `spec`
    ///
    /// Never fails: infrastructure problems come back as
    /// `Verdict::InfraError` and are not cached.
    pub async fn submit(&self, snippet: impl Into<Arc<Snippet>>, spec: ExecutionSpec) -> VerificationResult {
        self.run(snippet.into(), spec, None).await
    }

    /// Same as [`submit`](Self::submit)
    pub async fn verify(&self, snippet: impl Into<Arc<Snippet>>, spec: ExecutionSpec) -> VerificationResult {
        self.run(snippet.into(), spec, None).await
    }

    /// Verify with a cancellation signal honoured while queued
    pub async fn submit_with_cancel(
        &self,
        snippet: impl Into<Arc<Snippet>>,
        spec: ExecutionSpec,
        cancel: &CancelToken,
    ) -> VerificationResult {
        self.run(snippet.into(), spec, Some(cancel)).await
    }

    /// Verify using the registry's spec for the snippet's language
    pub async fn submit_for_language(&self, snippet: impl Into<Arc<Snippet>>) -> VerificationResult {
        let snippet = snippet.into();
        match self.spec_for(snippet.language()) {
            Ok(spec) => self.run(snippet, spec, None).await,
            Err(err) => {
                self.runner.counters.submitted.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("snipverify_submissions_total").increment(1);
                tracing::warn!(snippet = %snippet.id(), error = %err, "no runtime profile");
                self.finish(VerificationResult::infra(
                    InfraErrorKind::UnsupportedLanguage,
                    err.to_string(),
                    Duration::ZERO,
                ))
            }
        }
    }

    /// Registry spec for `language`, with the configured output bound
    ///
    /// # Errors
    /// Returns `UnsupportedLanguage` if no profile is registered
    pub fn spec_for(&self, language: &Language) -> Result<ExecutionSpec, UnsupportedLanguage> {
        self.registry
            .spec_for(language)
            .map(|spec| spec.with_output_limit(self.config.output_limit_bytes))
    }

    /// Cached verdict for a fingerprint, if live
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<VerificationResult> {
        self.runner.cache.get(fingerprint).await
    }

    #[tracing::instrument(
        name = "verify",
        skip_all,
        fields(
            snippet = %snippet.id(),
            language = %spec.language(),
            fingerprint = tracing::field::Empty,
        )
    )]
    async fn run(
        &self,
        snippet: Arc<Snippet>,
        spec: ExecutionSpec,
        cancel: Option<&CancelToken>,
    ) -> VerificationResult {
        self.runner.counters.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("snipverify_submissions_total").increment(1);

        // The sandbox runs exactly the text the fingerprint covers.
        let snippet = runnable(snippet);
        let fingerprint = Fingerprint::compute(&snippet, &spec);
        tracing::Span::current().record("fingerprint", tracing::field::display(fingerprint.short()));

        if let Some(hit) = self.runner.cache.get(&fingerprint).await {
            self.runner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("snipverify_cache_hits_total").increment(1);
            tracing::debug!(verdict = %hit.verdict, "cache hit");
            return self.finish(hit);
        }

        let queued_at = Instant::now();
        let mut job = VerificationJob::queued(snippet, spec, fingerprint, Arc::clone(&self.jobs));
        let slot = match self.pool.acquire(self.config.queue_timeout(), cancel).await {
            Ok(slot) => slot,
            Err(err) => {
                let kind = match err {
                    AcquireError::Cancelled => InfraErrorKind::Cancelled,
                    AcquireError::Saturated { .. } | AcquireError::Closed => InfraErrorKind::PoolSaturated,
                };
                tracing::warn!(job = %job.id(), error = %err, "no worker slot");
                job.advance(JobStatus::InfraError);
                return self.finish(VerificationResult::infra(kind, err.to_string(), queued_at.elapsed()));
            }
        };

        let job_id = job.id();
        let task = tokio::spawn(
            self.runner
                .clone()
                .run(job, slot)
                .instrument(tracing::Span::current()),
        );
        let result = match task.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(job = %job_id, error = %err, "job task aborted");
                VerificationResult::infra(
                    InfraErrorKind::ExecutionFault,
                    format!("job task aborted: {err}"),
                    queued_at.elapsed(),
                )
            }
        };
        self.finish(result)
    }

    fn finish(&self, result: VerificationResult) -> VerificationResult {
        self.runner.counters.record(result.verdict);
        result
    }

    /// Stop accepting new work; in-flight jobs finish normally
    pub fn shutdown(&self) {
        self.pool.close();
    }

    /// Jobs executing right now
    #[inline]
    #[must_use]
    pub fn running_jobs(&self) -> usize {
        self.jobs.running()
    }

    /// Get engine statistics
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let c = &self.runner.counters;
        EngineStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            executions: c.executions.load(Ordering::Relaxed),
            provision_retries: c.provision_retries.load(Ordering::Relaxed),
            queued: self.jobs.queued(),
            running: self.jobs.running(),
            peak_running: self.jobs.peak_running(),
            verified: c.verified.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            infra_errors: c.infra_errors.load(Ordering::Relaxed),
            pool: self.pool.stats(),
            cache_entries: self.runner.cache.entry_count(),
        }
    }

    /// Live job states
    #[inline]
    #[must_use]
    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    /// Verdict cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &FingerprintCache {
        &self.runner.cache
    }

    /// Language registry used by `submit_for_language`
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Sandbox backend
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> &SharedRuntime {
        &self.runner.runtime
    }

    /// Configuration the engine was built from
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
