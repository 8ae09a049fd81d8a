//! Container runtime backed by the `docker` CLI
//!
//! One container per verification attempt:
//! 1. `provision` creates a scratch workspace and `docker create`s a
//!    locked-down container that bind-mounts it read-only at `/sandbox`
//! 2. `execute` writes the snippet into the workspace and runs
//!    `docker start --attach`, capturing bounded output
//! 3. `teardown` force-removes the container and deletes the workspace
//!
//! The container never gets a network, capabilities, a writable root
//! filesystem or more than the ceiling's memory/CPU/pids.

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
use tokio::process::Command;

const RUNTIME_NAME: &str = "docker";
const MOUNT_POINT: &str = "/sandbox";
const LABEL: &str = "snipverify.job";

/// Per-environment state kept between provision and teardown
#[derive(Debug)]
struct DockerEnvironment {
    container: String,
    workspace: TempDir,
    source_file: String,
    output_limit: usize,
}

/// Docker CLI sandbox runtime
#[derive(Debug)]
pub struct DockerRuntime {
    binary: PathBuf,
    tmpfs_size: String,
    environments: DashMap<String, DockerEnvironment>,
}

impl DockerRuntime {
    /// Runtime using `docker` from `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Runtime using a specific CLI binary (e.g. `podman`)
    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            tmpfs_size: "16m".to_string(),
            environments: DashMap::new(),
        }
    }

    /// Number of environments currently provisioned
    #[inline]
    #[must_use]
    pub fn live_environments(&self) -> usize {
        self.environments.len()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    async fn remove_container(&self, container: &str) {
        let output = self
            .command()
            .args(["rm", "--force", "--volumes", container])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {}
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                if !stderr.contains("No such container") {
                    tracing::warn!(container, stderr = %stderr.trim(), "docker rm failed");
                }
            }
            Err(e) => tracing::warn!(container, error = %e, "could not run docker rm"),
        }
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for `docker create`
#[must_use]
pub fn create_args(
    container: &str,
    spec: &ExecutionSpec,
    workspace: &Path,
    tmpfs_size: &str,
) -> Vec<String> {
    let ceiling = spec.ceiling();
    let profile = spec.profile();
    let source_path = format!("{MOUNT_POINT}/{}", profile.source_file);

    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        container.to_string(),
        "--label".to_string(),
        format!("{LABEL}={container}"),
        "--network".to_string(),
        "none".to_string(),
        "--memory".to_string(),
        format!("{}b", ceiling.memory_bytes),
        "--memory-swap".to_string(),
        format!("{}b", ceiling.memory_bytes),
        "--cpus".to_string(),
        format!("{:.3}", ceiling.cpus()),
        "--pids-limit".to_string(),
        ceiling.pids.to_string(),
        "--read-only".to_string(),
        "--tmpfs".to_string(),
        format!("/tmp:rw,noexec,nosuid,size={tmpfs_size}"),
        "--cap-drop".to_string(),
        "ALL".to_string(),
        "--security-opt".to_string(),
        "no-new-privileges".to_string(),
        "--volume".to_string(),
        format!("{}:{MOUNT_POINT}:ro", workspace.display()),
        "--workdir".to_string(),
        MOUNT_POINT.to_string(),
        profile.image.clone(),
    ];
    args.extend(profile.argv(&source_path));
    args
}

fn classify_create_failure(stderr: &str) -> ProvisionError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("cannot connect to the docker daemon") || lower.contains("is the docker daemon running") {
        ProvisionError::Unavailable(stderr.trim().to_string())
    } else if lower.contains("no space left") || lower.contains("cannot allocate memory") {
        ProvisionError::ResourceExhausted(stderr.trim().to_string())
    } else if lower.contains("pull access denied") || lower.contains("invalid reference format") {
        ProvisionError::InvalidSpec(stderr.trim().to_string())
    } else {
        ProvisionError::CreateFailed(stderr.trim().to_string())
    }
}

fn is_daemon_error(stderr: &str) -> bool {
    stderr.starts_with("Error response from daemon")
        || stderr.starts_with("Cannot connect to the Docker daemon")
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        RUNTIME_NAME
    }

    async fn is_available(&self) -> bool {
        self.command()
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn provision(&self, spec: &ExecutionSpec) -> Result<EnvironmentHandle, ProvisionError> {
        let workspace = tempfile::Builder::new().prefix("snipverify-").tempdir()?;
        let container = format!("snipverify-{}", ulid::Ulid::new().to_string().to_ascii_lowercase());
        let args = create_args(&container, spec, workspace.path(), &self.tmpfs_size);

        let output = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ProvisionError::Unavailable(format!(
                    "{} not found",
                    self.binary.display()
                )),
                _ => ProvisionError::Io(e),
            })?;

        if !output.status.success() {
            return Err(classify_create_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        tracing::debug!(container = %container, image = %spec.profile().image, "container created");
        self.environments.insert(
            container.clone(),
            DockerEnvironment {
                container: container.clone(),
                workspace,
                source_file: spec.profile().source_file.clone(),
                output_limit: spec.output_limit(),
            },
        );
        Ok(EnvironmentHandle::new(RUNTIME_NAME, container))
    }

    async fn execute(
        &self,
        handle: &EnvironmentHandle,
        snippet: &Snippet,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let (container, source_path, output_limit) = {
            let env = self
                .environments
                .get(handle.id())
                .ok_or_else(|| ExecutionError::UnknownEnvironment(handle.to_string()))?;
            (
                env.container.clone(),
                env.workspace.path().join(&env.source_file),
                env.output_limit,
            )
        };

        tokio::fs::write(&source_path, snippet.source()).await?;

        let started = Instant::now();
        let mut child = self
            .command()
            .args(["start", "--attach", &container])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = read_pipe(child.stdout.take(), output_limit);
        let stderr = read_pipe(child.stderr.take(), output_limit);
        let (stdout, stderr) = tokio::try_join!(stdout, stderr)?;
        let status = child.wait().await?;
        let elapsed = started.elapsed();

        let exit_code = exit_code_of(status);
        if exit_code != 0 && is_daemon_error(stderr.as_str()) {
            return Err(ExecutionError::IsolationFault(stderr.text.trim().to_string()));
        }

        Ok(ExecutionOutcome {
            exit_code,
            stdout,
            stderr,
            elapsed,
        })
    }

    async fn teardown(&self, handle: &EnvironmentHandle) {
        let Some((_, env)) = self.environments.remove(handle.id()) else {
            return;
        };
        self.remove_container(&env.container).await;
        if let Err(e) = env.workspace.close() {
            tracing::warn!(container = %env.container, error = %e, "workspace cleanup failed");
        }
        tracing::debug!(container = %env.container, "container removed");
    }
}
