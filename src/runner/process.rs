//! Host process runner
//!
//! Launches programs directly on the host with a wall-clock timeout.
//! Optional rlimits are applied in the child before exec.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};

/// Runner that executes programs as host processes
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(cmd: &CommandSpec, limits: &RunLimits) -> Command {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if !cmd.env.is_empty() {
            command.env_clear();
            command.envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        if let Some(dir) = &cmd.work_dir {
            command.current_dir(dir);
        }

        apply_rlimits(&mut command, limits);
        command
    }
}

#[cfg(target_os = "linux")]
fn apply_rlimits(command: &mut Command, limits: &RunLimits) {
    use nix::libc::rlim_t;
    use nix::sys::resource::{setrlimit, Resource};

    if limits.memory_mb.is_none() && limits.cpu_secs.is_none() {
        return;
    }

    let memory = limits
        .memory_mb
        .map(|mb| rlim_t::from(mb) * 1024 * 1024);
    let cpu = limits.cpu_secs.map(rlim_t::from);

    // SAFETY: the closure only calls setrlimit, which is async-signal-safe.
    unsafe {
        command.pre_exec(move || {
            if let Some(bytes) = memory {
                setrlimit(Resource::RLIMIT_AS, bytes, bytes).map_err(std::io::Error::from)?;
            }
            if let Some(secs) = cpu {
                setrlimit(Resource::RLIMIT_CPU, secs, secs).map_err(std::io::Error::from)?;
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_rlimits(_command: &mut Command, limits: &RunLimits) {
    if limits.memory_mb.is_some() || limits.cpu_secs.is_some() {
        debug!("rlimits are only applied on Linux; running without them");
    }
}

/// Human-readable name for a terminating signal
pub fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {}", signal))
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(&self, cmd: &CommandSpec, limits: &RunLimits) -> Result<RunOutcome> {
        debug!("Running {:?} (timeout {:?})", cmd.to_vec(), limits.timeout);

        let child = Self::build_command(cmd, limits)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", cmd.program))?;

        // Dropping the child on timeout kills it (kill_on_drop)
        let output = match tokio::time::timeout(limits.timeout, child.wait_with_output()).await {
            Ok(output) => output.with_context(|| format!("Failed to wait for {}", cmd.program))?,
            Err(_) => {
                warn!("{} timed out after {:?}", cmd.program, limits.timeout);
                return Ok(RunOutcome::timed_out());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let status = match output.status.code() {
            Some(code) => RunStatus::Exited(code),
            None => {
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    RunStatus::Signaled(output.status.signal().unwrap_or(-1))
                }
                #[cfg(not(unix))]
                {
                    RunStatus::Exited(-1)
                }
            }
        };

        Ok(RunOutcome {
            status,
            stdout,
            stderr,
        })
    }
}
