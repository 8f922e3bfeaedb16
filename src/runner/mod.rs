//! Runner module - Process launch abstraction layer
//!
//! Every external program the pipeline starts (scanners, the interpreter,
//! the container runtime) goes through a `Runner`:
//! - `ProcessRunner`: launches real host processes with a wall-clock timeout
//!
//! The runner module does NOT:
//! - Interpret tool output or decide pass/fail
//! - Write snippets to disk
//! - Know about challenges or scoring

pub mod process;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command specification for execution
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Environment variables (key, value); the environment is cleared when non-empty
    pub env: Vec<(String, String)>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            work_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.clone());
        v
    }
}

/// Resource limits for execution
#[derive(Debug, Clone, PartialEq)]
pub struct RunLimits {
    /// Wall-clock timeout; the process is killed when it expires
    pub timeout: Duration,
    /// Address-space ceiling in MB applied to the child (Linux only)
    pub memory_mb: Option<u32>,
    /// CPU-time ceiling in seconds applied to the child (Linux only)
    pub cpu_secs: Option<u32>,
}

impl RunLimits {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            memory_mb: None,
            cpu_secs: None,
        }
    }

    pub fn with_memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    pub fn with_cpu_secs(mut self, cpu_secs: u32) -> Self {
        self.cpu_secs = Some(cpu_secs);
        self
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Execution status (raw, no interpretation)
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Wall-clock timeout expired and the process was killed
    TimedOut,
    /// Killed by signal
    Signaled(i32),
}

/// Outcome of running a program
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutcome {
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Exited(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            status: RunStatus::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Exit code if the program exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            RunStatus::Exited(code) => Some(code),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == Some(0)
    }

    /// Best human-readable diagnostic: stderr, then stdout
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Runner trait for launching programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Resolve a program name to an executable path, `None` when not installed
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    /// Run a command to completion or until the timeout expires.
    ///
    /// An `Err` means the process could not be launched at all.
    async fn run(&self, cmd: &CommandSpec, limits: &RunLimits) -> Result<RunOutcome>;
}

// Re-exports
pub use process::ProcessRunner;
