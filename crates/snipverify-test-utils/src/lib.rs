//! Testing utilities for the snipverify workspace
//!
//! - [`ScriptedRuntime`]: in-memory [`SandboxRuntime`] with programmable
//!   behaviour and call counters
//! - Snippet and spec fixtures

#![allow(missing_docs)]

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use snipverify_core::{
    CapturedOutput, ExecutionSpec, Language, ResourceCeiling, RuntimeProfile, Snippet,
};
use snipverify_sandbox::{
    EnvironmentHandle, ExecutionError, ExecutionOutcome, ProvisionError, SandboxRuntime,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const RUNTIME_NAME: &str = "scripted";

/// What a scripted execution does
#[derive(Debug, Clone)]
pub enum Script {
    /// Exit immediately
    Exit { code: i32, stdout: String, stderr: String },
    /// Sleep, then exit 0 with `stdout`
    Sleep { duration: Duration, stdout: String },
    /// Never finish
    Hang,
    /// Report an isolation fault
    Fault(String),
    /// Wait for a permit on the gate, then exit 0
    Gate(Arc<Semaphore>),
}

impl Script {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::Exit {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stderr: impl Into<String>) -> Self {
        Self::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn sleep(duration: Duration) -> Self {
        Self::Sleep {
            duration,
            stdout: String::new(),
        }
    }
}

/// How provisioning behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionScript {
    Succeed,
    /// Fail (retryably) this many times, then succeed
    FailFirst(usize),
    /// Always fail retryably
    FailAlways,
    /// Fail with a non-retryable error
    Reject,
    /// Never answer
    Hang,
}

struct RunningGuard<'a>(&'a ScriptedRuntime);

impl<'a> RunningGuard<'a> {
    fn enter(runtime: &'a ScriptedRuntime) -> Self {
        let now = runtime.running.fetch_add(1, Ordering::SeqCst) + 1;
        runtime.peak_running.fetch_max(now, Ordering::SeqCst);
        Self(runtime)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory sandbox runtime for tests
#[derive(Debug)]
pub struct ScriptedRuntime {
    default_script: Mutex<Script>,
    rules: Mutex<Vec<(String, Script)>>,
    provision: Mutex<ProvisionScript>,
    provision_delay: Mutex<Duration>,
    provision_calls: AtomicUsize,
    execute_calls: AtomicUsize,
    teardown_calls: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    live: DashMap<String, usize>,
    teardowns: DashMap<String, usize>,
}

impl ScriptedRuntime {
    /// Runtime whose executions print nothing and exit 0
    #[must_use]
    pub fn new() -> Self {
        Self::with_default(Script::ok(""))
    }

    #[must_use]
    pub fn with_default(script: Script) -> Self {
        Self {
            default_script: Mutex::new(script),
            rules: Mutex::new(Vec::new()),
            provision: Mutex::new(ProvisionScript::Succeed),
            provision_delay: Mutex::new(Duration::ZERO),
            provision_calls: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
            teardown_calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
            live: DashMap::new(),
            teardowns: DashMap::new(),
        }
    }

    /// Snippets whose source contains `needle` follow `script`
    #[must_use]
    pub fn on_source(self, needle: impl Into<String>, script: Script) -> Self {
        self.rules.lock().push((needle.into(), script));
        self
    }

    #[must_use]
    pub fn with_provision(self, script: ProvisionScript) -> Self {
        *self.provision.lock() = script;
        self
    }

    #[must_use]
    pub fn with_provision_delay(self, delay: Duration) -> Self {
        *self.provision_delay.lock() = delay;
        self
    }

    pub fn set_default(&self, script: Script) {
        *self.default_script.lock() = script;
    }

    pub fn provision_calls(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn teardown_calls(&self) -> usize {
        self.teardown_calls.load(Ordering::SeqCst)
    }

    /// Executions in progress
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest concurrent executions observed
    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    /// Environments provisioned and not yet torn down
    pub fn live_environments(&self) -> usize {
        self.live.len()
    }

    /// Largest number of teardowns any single environment received
    pub fn max_teardowns_per_environment(&self) -> usize {
        self.teardowns.iter().map(|e| *e.value()).max().unwrap_or(0)
    }

    fn script_for(&self, snippet: &Snippet) -> Script {
        self.rules
            .lock()
            .iter()
            .find(|(needle, _)| snippet.source().contains(needle.as_str()))
            .map_or_else(|| self.default_script.lock().clone(), |(_, script)| script.clone())
    }
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn outcome(code: i32, stdout: &str, stderr: &str, limit: usize, elapsed: Duration) -> ExecutionOutcome {
    ExecutionOutcome {
        exit_code: code,
        stdout: CapturedOutput::capture(stdout.as_bytes(), limit),
        stderr: CapturedOutput::capture(stderr.as_bytes(), limit),
        elapsed,
    }
}

#[async_trait]
impl SandboxRuntime for ScriptedRuntime {
    fn name(&self) -> &'static str {
        RUNTIME_NAME
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn provision(&self, spec: &ExecutionSpec) -> Result<EnvironmentHandle, ProvisionError> {
        let call = self.provision_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.provision_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let script = *self.provision.lock();
        match script {
            ProvisionScript::Succeed => {}
            ProvisionScript::FailFirst(n) if call > n => {}
            ProvisionScript::FailFirst(_) | ProvisionScript::FailAlways => {
                return Err(ProvisionError::Unavailable(format!("scripted failure #{call}")));
            }
            ProvisionScript::Reject => {
                return Err(ProvisionError::InvalidSpec("scripted rejection".into()));
            }
            ProvisionScript::Hang => return std::future::pending().await,
        }

        let id = ulid::Ulid::new().to_string();
        self.live.insert(id.clone(), spec.output_limit());
        Ok(EnvironmentHandle::new(RUNTIME_NAME, id))
    }

    async fn execute(
        &self,
        handle: &EnvironmentHandle,
        snippet: &Snippet,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        let limit = self
            .live
            .get(handle.id())
            .map(|e| *e.value())
            .ok_or_else(|| ExecutionError::UnknownEnvironment(handle.to_string()))?;
        let _running = RunningGuard::enter(self);

        match self.script_for(snippet) {
            Script::Exit { code, stdout, stderr } => {
                Ok(outcome(code, &stdout, &stderr, limit, Duration::from_millis(1)))
            }
            Script::Sleep { duration, stdout } => {
                tokio::time::sleep(duration).await;
                Ok(outcome(0, &stdout, "", limit, duration))
            }
            Script::Hang => std::future::pending().await,
            Script::Fault(reason) => Err(ExecutionError::IsolationFault(reason)),
            Script::Gate(gate) => {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|_| ExecutionError::IsolationFault("gate closed".into()))?;
                Ok(outcome(0, "", "", limit, Duration::from_millis(1)))
            }
        }
    }

    async fn teardown(&self, handle: &EnvironmentHandle) {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
        *self.teardowns.entry(handle.id().to_string()).or_insert(0) += 1;
        self.live.remove(handle.id());
    }
}

/// Python runtime profile
pub fn python_profile() -> RuntimeProfile {
    RuntimeProfile::new(Language::Python, "python:3.12-alpine", ["python3", "-B"], "snippet.py")
}

/// Python spec with the default ceiling
pub fn python_spec() -> ExecutionSpec {
    ExecutionSpec::new(python_profile(), ResourceCeiling::default())
}

/// Python spec with a custom deadline
pub fn python_spec_with_deadline(deadline: Duration) -> ExecutionSpec {
    python_spec().with_deadline(deadline)
}

/// Python snippet
pub fn python_snippet(source: &str) -> Snippet {
    Snippet::new(source, Language::Python)
}

/// Shared scripted runtime plus the trait-object view the engine takes
pub fn shared(runtime: ScriptedRuntime) -> (Arc<ScriptedRuntime>, Arc<dyn SandboxRuntime>) {
    let runtime = Arc::new(runtime);
    let dyn_runtime: Arc<dyn SandboxRuntime> = runtime.clone();
    (runtime, dyn_runtime)
}
