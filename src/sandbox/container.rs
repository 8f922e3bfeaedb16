//! Containerized sandbox: disposable container per check
//!
//! The snippet directory is bind-mounted read-only at `/sandbox` and the
//! same compile-only script runs inside the image with networking
//! disabled, a memory ceiling and a CPU-share limit. Runtime problems are
//! reported as `Unavailable` so operators can tell infrastructure
//! failures apart from rejected code.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{DenyList, SandboxExecutor, SandboxOutcome, CHECK_SCRIPT, PASSED_MESSAGE};
use crate::config::SandboxConfig;
use crate::error::ConfigError;
use crate::runner::process::signal_name;
use crate::runner::{CommandSpec, RunLimits, RunStatus, Runner};
use crate::snippet::{SnippetDir, SNIPPET_FILE};

/// Dynamic evaluation is left to the container's isolation
pub const DEFAULT_DENY_PATTERNS: &[&str] = &[
    r"os\.system\(",
    r"os\.popen\(",
    r"subprocess\.Popen\(",
];

const MOUNT_POINT: &str = "/sandbox";
const PIDS_LIMIT: u32 = 64;
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit codes the runtime itself uses for launch failures
/// (125: daemon error, 126: command not executable, 127: command not found)
const RUNTIME_FAILURE_CODES: [i32; 3] = [125, 126, 127];

pub struct ContainerSandbox {
    runtime: String,
    image: String,
    timeout: Duration,
    memory_mb: u32,
    cpu_shares: u32,
    deny: DenyList,
    runner: Arc<dyn Runner>,
}

impl ContainerSandbox {
    pub fn new(config: &SandboxConfig, runner: Arc<dyn Runner>) -> Result<Self, ConfigError> {
        Ok(Self {
            runtime: config.runtime.clone(),
            image: config.image.clone(),
            timeout: config.timeout(),
            memory_mb: config.memory_mb,
            cpu_shares: config.cpu_shares,
            deny: DenyList::from_config(config, DEFAULT_DENY_PATTERNS)?,
            runner,
        })
    }

    fn build_command(&self, runtime: String, name: &str, snippet: &SnippetDir) -> CommandSpec {
        CommandSpec::new(runtime)
            .with_args(["run", "--rm", "--name", name])
            .with_args(["--network", "none"])
            .arg("--memory")
            .arg(format!("{}m", self.memory_mb))
            .arg("--cpu-shares")
            .arg(self.cpu_shares.to_string())
            .arg("--pids-limit")
            .arg(PIDS_LIMIT.to_string())
            .arg("--read-only")
            .arg("-v")
            .arg(format!("{}:{}:ro", snippet.dir().display(), MOUNT_POINT))
            .arg(self.image.clone())
            .with_args(["python", "-I", "-S", "-c", CHECK_SCRIPT])
            .arg(format!("{}/{}", MOUNT_POINT, SNIPPET_FILE))
    }

    /// Best-effort removal of a container left behind by a timeout
    async fn remove_container(&self, runtime: &str, name: &str) {
        let cmd = CommandSpec::new(runtime).with_args(["rm", "-f", name]);
        match self.runner.run(&cmd, &RunLimits::new(CLEANUP_TIMEOUT)).await {
            Ok(outcome) if outcome.is_success() => debug!("Removed container {}", name),
            Ok(outcome) => debug!("Container {} removal: {}", name, outcome.diagnostic()),
            Err(e) => warn!("Failed to remove container {}: {:#}", name, e),
        }
    }
}

#[async_trait]
impl SandboxExecutor for ContainerSandbox {
    async fn run(&self, code: &str) -> Result<SandboxOutcome> {
        if let Some(rejected) = self.deny.screen(code) {
            return Ok(rejected);
        }

        let Some(runtime) = self.runner.locate(&self.runtime) else {
            return Ok(SandboxOutcome::Unavailable(format!(
                "Sandbox unavailable: container runtime '{}' not found",
                self.runtime
            )));
        };
        let runtime = runtime.display().to_string();

        let snippet =
            SnippetDir::write("sandbox-", code).context("Failed to stage sandbox snippet")?;
        let name = format!("scoring-{}", Uuid::new_v4());
        let cmd = self.build_command(runtime.clone(), &name, &snippet);

        let outcome = match self.runner.run(&cmd, &RunLimits::new(self.timeout)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Container launch failed: {:#}", e);
                return Ok(SandboxOutcome::Unavailable(format!(
                    "Sandbox unavailable: container launch failed: {:#}",
                    e
                )));
            }
        };

        let result = match outcome.status {
            RunStatus::Exited(0) => SandboxOutcome::Passed(PASSED_MESSAGE.to_string()),
            RunStatus::Exited(code) if RUNTIME_FAILURE_CODES.contains(&code) => {
                warn!("Container runtime exited with {}", code);
                SandboxOutcome::Unavailable(format!(
                    "Sandbox unavailable: container launch failed ({}): {}",
                    code,
                    outcome.diagnostic()
                ))
            }
            RunStatus::Exited(_) => SandboxOutcome::Rejected(format!(
                "Sandbox compilation failed: {}",
                outcome.diagnostic()
            )),
            RunStatus::TimedOut => {
                self.remove_container(&runtime, &name).await;
                SandboxOutcome::Rejected(format!(
                    "Sandbox timed out after {}s",
                    self.timeout.as_secs()
                ))
            }
            RunStatus::Signaled(sig) => SandboxOutcome::Unavailable(format!(
                "Sandbox unavailable: container runtime killed by {}",
                signal_name(sig)
            )),
        };
        Ok(result)
    }
}
