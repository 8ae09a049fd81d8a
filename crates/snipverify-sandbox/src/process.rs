//! Local process runtime
//!
//! Runs the interpreter directly on the host inside a fresh scratch
//! directory, with a cleared environment and closed stdin. On unix the
//! interpreter leads its own process group. The whole group is killed once
//! the interpreter exits, when the `execute` future is dropped, and again
//! on teardown, so backgrounded children never outlive the run.
//!
//! Memory, CPU and network ceilings are NOT enforced here. Use this backend
//! only for trusted snippets or on hosts without a container runtime.

use crate::capture::read_pipe;
use crate::error::{ExecutionError, ProvisionError};
use crate::runtime::{exit_code_of, EnvironmentHandle, ExecutionOutcome, SandboxRuntime};
use async_trait::async_trait;
use dashmap::DashMap;
use snipverify_core::{ExecutionSpec, Snippet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tempfile::TempDir;
use tokio::process::{Child, Command};

const RUNTIME_NAME: &str = "process";
const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

#[derive(Debug)]
struct ProcessEnvironment {
    workdir: TempDir,
    program: PathBuf,
    args: Vec<String>,
    source_file: String,
    output_limit: usize,
    process_group: Option<i32>,
}

/// Kills a run's process group when finished or dropped
#[derive(Debug)]
struct ProcessGroup(Option<i32>);

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self(child.id().and_then(|pid| i32::try_from(pid).ok()))
    }

    fn id(&self) -> Option<i32> {
        self.0
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.0.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: i32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, error = %e, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: i32) {}

/// Host-process sandbox runtime
#[derive(Debug)]
pub struct ProcessRuntime {
    search_path: String,
    environments: DashMap<String, ProcessEnvironment>,
}

impl ProcessRuntime {
    /// Runtime resolving interpreters from a minimal default `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self::with_search_path(DEFAULT_PATH)
    }

    /// Runtime resolving interpreters from `search_path`
    #[must_use]
    pub fn with_search_path(search_path: impl Into<String>) -> Self {
        Self {
            search_path: search_path.into(),
            environments: DashMap::new(),
        }
    }

    /// Number of environments currently provisioned
    #[inline]
    #[must_use]
    pub fn live_environments(&self) -> usize {
        self.environments.len()
    }

    fn resolve(&self, program: &str) -> Option<PathBuf> {
        let candidate = Path::new(program);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        std::env::split_paths(&self.search_path)
            .map(|dir| dir.join(program))
            .find(|p| p.is_file())
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxRuntime for ProcessRuntime {
    fn name(&self) -> &'static str {
        RUNTIME_NAME
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn provision(&self, spec: &ExecutionSpec) -> Result<EnvironmentHandle, ProvisionError> {
        let profile = spec.profile();
        let (program, args) = profile
            .command
            .split_first()
            .ok_or_else(|| ProvisionError::InvalidSpec(format!("empty command for {}", profile.language)))?;
        let program = self.resolve(program).ok_or_else(|| {
            ProvisionError::InvalidSpec(format!("interpreter {program:?} not found on {}", self.search_path))
        })?;

        let workdir = tempfile::Builder::new().prefix("snipverify-proc-").tempdir()?;
        let id = ulid::Ulid::new().to_string();
        self.environments.insert(
            id.clone(),
            ProcessEnvironment {
                workdir,
                program,
                args: args.to_vec(),
                source_file: profile.source_file.clone(),
                output_limit: spec.output_limit(),
                process_group: None,
            },
        );
        Ok(EnvironmentHandle::new(RUNTIME_NAME, id))
    }

    async fn execute(
        &self,
        handle: &EnvironmentHandle,
        snippet: &Snippet,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let (workdir, program, args, source_path, output_limit) = {
            let env = self
                .environments
                .get(handle.id())
                .ok_or_else(|| ExecutionError::UnknownEnvironment(handle.to_string()))?;
            let workdir = env.workdir.path().to_path_buf();
            let source_path = workdir.join(&env.source_file);
            (workdir, env.program.clone(), env.args.clone(), source_path, env.output_limit)
        };

        tokio::fs::write(&source_path, snippet.source()).await?;

        let started = Instant::now();
        let mut command = Command::new(&program);
        command
            .args(&args)
            .arg(&source_path)
            .current_dir(&workdir)
            .env_clear()
            .env("PATH", &self.search_path)
            .env("HOME", &workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command
            .spawn()
            .map_err(|e| ExecutionError::IsolationFault(format!("spawn {}: {e}", program.display())))?;

        let mut group = ProcessGroup::of(&child);
        if let Some(mut env) = self.environments.get_mut(handle.id()) {
            env.process_group = group.id();
        }

        let stdout = read_pipe(child.stdout.take(), output_limit);
        let stderr = read_pipe(child.stderr.take(), output_limit);
        let waited = async {
            let status = child.wait().await;
            // Stragglers may still hold the pipes open.
            group.kill();
            status
        };
        let (status, stdout, stderr) = tokio::join!(waited, stdout, stderr);

        Ok(ExecutionOutcome {
            exit_code: exit_code_of(status?),
            stdout: stdout?,
            stderr: stderr?,
            elapsed: started.elapsed(),
        })
    }

    async fn teardown(&self, handle: &EnvironmentHandle) {
        if let Some((id, env)) = self.environments.remove(handle.id()) {
            if let Some(pgid) = env.process_group {
                kill_group(pgid);
            }
            if let Err(e) = env.workdir.close() {
                tracing::warn!(env = %id, error = %e, "scratch dir cleanup failed");
            }
        }
    }
}
