//! Local sandbox: host interpreter in isolated mode
//!
//! The snippet is written to a private temp directory and compiled with
//! `python3 -I -S`, under a wall-clock timeout and (on Linux) address-space
//! and CPU-time rlimits.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{DenyList, SandboxExecutor, SandboxOutcome, CHECK_SCRIPT, PASSED_MESSAGE};
use crate::config::SandboxConfig;
use crate::error::ConfigError;
use crate::runner::process::signal_name;
use crate::runner::{CommandSpec, RunLimits, RunStatus, Runner};
use crate::snippet::SnippetDir;

/// Shell, process and dynamic-evaluation primitives
pub const DEFAULT_DENY_PATTERNS: &[&str] = &[
    r"os\.system\(",
    r"os\.popen\(",
    r"subprocess\.Popen\(",
    r"\beval\(",
    r"\bexec\(",
];

/// The interpreter sees only these variables, never the worker's environment
const INTERPRETER_ENV: &[(&str, &str)] = &[
    ("PATH", "/usr/local/bin:/usr/bin:/bin"),
    ("LANG", "C.UTF-8"),
];

pub struct LocalSandbox {
    python: String,
    timeout: Duration,
    memory_mb: u32,
    cpu_secs: u32,
    deny: DenyList,
    runner: Arc<dyn Runner>,
}

impl LocalSandbox {
    pub fn new(config: &SandboxConfig, runner: Arc<dyn Runner>) -> Result<Self, ConfigError> {
        Ok(Self {
            python: config.python.clone(),
            timeout: config.timeout(),
            memory_mb: config.memory_mb,
            cpu_secs: config.cpu_secs,
            deny: DenyList::from_config(config, DEFAULT_DENY_PATTERNS)?,
            runner,
        })
    }

    fn limits(&self) -> RunLimits {
        RunLimits::new(self.timeout)
            .with_memory_mb(self.memory_mb)
            .with_cpu_secs(self.cpu_secs)
    }
}

#[async_trait]
impl SandboxExecutor for LocalSandbox {
    async fn run(&self, code: &str) -> Result<SandboxOutcome> {
        if let Some(rejected) = self.deny.screen(code) {
            return Ok(rejected);
        }

        let Some(python) = self.runner.locate(&self.python) else {
            return Ok(SandboxOutcome::Unavailable(format!(
                "Sandbox unavailable: interpreter '{}' not found",
                self.python
            )));
        };

        let snippet = SnippetDir::write("sandbox-", code).context("Failed to stage sandbox snippet")?;

        let cmd = INTERPRETER_ENV.iter().fold(
            CommandSpec::new(python.display().to_string())
                .with_args(["-I", "-S", "-c", CHECK_SCRIPT])
                .arg(snippet.file().display().to_string())
                .with_work_dir(snippet.dir()),
            |cmd, (key, value)| cmd.with_env(*key, *value),
        );

        let outcome = match self.runner.run(&cmd, &self.limits()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Local sandbox launch failed: {:#}", e);
                return Ok(SandboxOutcome::Unavailable(format!(
                    "Sandbox unavailable: {:#}",
                    e
                )));
            }
        };

        let result = match outcome.status {
            RunStatus::Exited(0) => SandboxOutcome::Passed(PASSED_MESSAGE.to_string()),
            RunStatus::Exited(code) => {
                debug!("Local sandbox check exited with {}", code);
                SandboxOutcome::Rejected(format!(
                    "Sandbox compilation failed: {}",
                    outcome.diagnostic()
                ))
            }
            RunStatus::TimedOut => SandboxOutcome::Rejected(format!(
                "Sandbox timed out after {}s",
                self.timeout.as_secs()
            )),
            RunStatus::Signaled(sig) => SandboxOutcome::Rejected(format!(
                "Sandbox process killed by {}",
                signal_name(sig)
            )),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::RecordingRunner;
    use crate::runner::{ProcessRunner, RunOutcome};

    fn sandbox(runner: Arc<dyn Runner>) -> LocalSandbox {
        LocalSandbox::new(&SandboxConfig::default(), runner).unwrap()
    }

    #[tokio::test]
    async fn test_deny_list_hit_launches_nothing() {
        let runner = Arc::new(RecordingRunner::succeeding(&["python3"]));
        let sandbox = sandbox(runner.clone());

        for code in [
            "import os\nos.system('rm -rf /')\n",
            "import subprocess\nsubprocess.Popen(['ls'])\n",
            "eval(user_input)\n",
            "exec(payload)\n",
        ] {
            let outcome = sandbox.run(code).await.unwrap();
            assert!(matches!(outcome, SandboxOutcome::Rejected(_)), "{code}");
        }
        assert_eq!(runner.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_unavailable() {
        let runner = Arc::new(RecordingRunner::succeeding(&[]));
        let outcome = sandbox(runner.clone()).run("print(1)\n").await.unwrap();

        assert!(matches!(outcome, SandboxOutcome::Unavailable(ref m) if m.contains("python3")));
        assert_eq!(runner.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_command_is_isolated_compile_check() {
        let runner = Arc::new(RecordingRunner::succeeding(&["python3"]));
        let outcome = sandbox(runner.clone()).run("print(1)\n").await.unwrap();

        assert_eq!(outcome, SandboxOutcome::Passed(PASSED_MESSAGE.to_string()));
        let cmd = runner.last_launch().unwrap();
        assert_eq!(cmd.program, "/usr/bin/python3");
        assert_eq!(&cmd.args[..3], &["-I", "-S", "-c"]);
        assert!(cmd.args[3].contains("ast.parse"));
        assert!(cmd.args[4].ends_with("submission.py"));
        assert!(!std::path::Path::new(&cmd.args[4]).exists());
        let keys: Vec<_> = cmd.env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["PATH", "LANG"]);
    }

    #[tokio::test]
    async fn test_failure_modes_are_rejections() {
        let runner = Arc::new(RecordingRunner::new(&["python3"], |_| {
            Ok(RunOutcome::exited(1, "", "SyntaxError: invalid syntax (line 1)\n"))
        }));
        let outcome = sandbox(runner).run("def f(:\n").await.unwrap();
        assert_eq!(
            outcome,
            SandboxOutcome::Rejected(
                "Sandbox compilation failed: SyntaxError: invalid syntax (line 1)".into()
            )
        );

        let runner = Arc::new(RecordingRunner::new(&["python3"], |_| Ok(RunOutcome::timed_out())));
        let outcome = sandbox(runner).run("while True: pass\n").await.unwrap();
        assert!(matches!(outcome, SandboxOutcome::Rejected(ref m) if m.contains("timed out")));

        let runner = Arc::new(RecordingRunner::new(&["python3"], |_| {
            Err(anyhow::anyhow!("permission denied"))
        }));
        let outcome = sandbox(runner).run("print(1)\n").await.unwrap();
        assert!(matches!(outcome, SandboxOutcome::Unavailable(_)));
    }

    /// Exercises the real interpreter when one is installed
    #[tokio::test]
    async fn test_real_interpreter_accepts_handler_bodies() {
        let runner: Arc<dyn Runner> = Arc::new(ProcessRunner::new());
        if runner.locate("python3").is_none() {
            return;
        }
        let sandbox = sandbox(runner);

        let handler = "username = request.json['username']\n\
                       query = f\"SELECT id FROM users WHERE username = '{username}'\"\n\
                       return db.execute(query).fetchone()\n";
        for code in [handler, ""] {
            let outcome = sandbox.run(code).await.unwrap();
            assert!(outcome.is_passed(), "{:?}", outcome);
            assert!(outcome.message().to_lowercase().contains("succeeded"));
        }

        let outcome = sandbox.run("def broken(:\n").await.unwrap();
        assert!(matches!(outcome, SandboxOutcome::Rejected(ref m) if m.contains("SyntaxError")));
    }
}
