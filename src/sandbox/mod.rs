//! Sandbox module - Compile-only checks of untrusted snippets
//!
//! Two isolation strategies, selected once at startup by the configured driver:
//! - `LocalSandbox`: host interpreter in isolated mode under rlimits
//! - `ContainerSandbox`: disposable container with no network, a memory
//!   ceiling and a CPU-share limit, snippet mounted read-only
//!
//! Both screen the snippet against a deny-list before launching anything.
//!
//! The sandbox module does NOT:
//! - Execute the snippet (it is parsed, never run)
//! - Decide scores (the orchestrator reconciles outcomes)
//! - Retry failed launches

pub mod container;
pub mod local;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::config::{SandboxConfig, SandboxDriver};
use crate::error::ConfigError;
use crate::runner::Runner;

pub use container::ContainerSandbox;
pub use local::LocalSandbox;

/// Message reported when the deny-list pre-screen matches
pub const DENIED_MESSAGE: &str = "Sandbox detected disallowed system operation during execution.";

/// Message reported when the compile-only check passes
pub const PASSED_MESSAGE: &str = "Sandbox compilation succeeded.";

/// Python program run by both variants; argv[1] is the snippet path.
/// Only parses, so top-level `return` in handler bodies is accepted.
pub(crate) const CHECK_SCRIPT: &str = "\
import ast, sys
path = sys.argv[1]
with open(path, encoding='utf-8') as fh:
    source = fh.read()
try:
    ast.parse(source, path)
except SyntaxError as exc:
    print(f'SyntaxError: {exc.msg} (line {exc.lineno})', file=sys.stderr)
    sys.exit(1)
";

/// Result of one sandbox check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxOutcome {
    /// The snippet compiled; the message is informational
    Passed(String),
    /// The sandbox judged the snippet unsafe or broken
    Rejected(String),
    /// The sandbox infrastructure could not perform the check
    Unavailable(String),
}

impl SandboxOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, SandboxOutcome::Passed(_))
    }

    pub fn message(&self) -> &str {
        match self {
            SandboxOutcome::Passed(m)
            | SandboxOutcome::Rejected(m)
            | SandboxOutcome::Unavailable(m) => m,
        }
    }
}

/// An isolation strategy for the compile-only check.
///
/// Modeled conditions (deny-list hit, syntax error, timeout, missing
/// runtime) are reported through `SandboxOutcome`. An `Err` is an
/// unexpected fault and ends the scoring pass with `error`.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn run(&self, code: &str) -> Result<SandboxOutcome>;
}

/// Compiled deny-list patterns
#[derive(Debug, Clone)]
pub struct DenyList {
    patterns: Vec<Regex>,
}

impl DenyList {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| ConfigError::Pattern {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Configured patterns if any, otherwise the variant's defaults
    pub fn from_config(config: &SandboxConfig, defaults: &[&str]) -> Result<Self, ConfigError> {
        match &config.deny_patterns {
            Some(patterns) => Self::new(patterns.as_slice()),
            None => Self::new(defaults),
        }
    }

    /// First pattern matching `code`
    pub fn find(&self, code: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|re| re.is_match(code))
            .map(|re| re.as_str())
    }

    /// Pre-screen result: `Some(Rejected)` when a pattern matches
    pub fn screen(&self, code: &str) -> Option<SandboxOutcome> {
        let pattern = self.find(code)?;
        debug!("Snippet rejected by deny pattern {}", pattern);
        Some(SandboxOutcome::Rejected(DENIED_MESSAGE.to_string()))
    }
}

/// The sandbox selected by configuration
pub enum Sandbox {
    Local(LocalSandbox),
    Containerized(ContainerSandbox),
}

impl Sandbox {
    /// Build the configured sandbox, `None` when the driver is disabled
    pub fn from_config(
        config: &SandboxConfig,
        runner: Arc<dyn Runner>,
    ) -> Result<Option<Self>, ConfigError> {
        let sandbox = match config.driver {
            SandboxDriver::Disabled => return Ok(None),
            SandboxDriver::Local => Sandbox::Local(LocalSandbox::new(config, runner)?),
            SandboxDriver::Containerized => {
                Sandbox::Containerized(ContainerSandbox::new(config, runner)?)
            }
        };
        Ok(Some(sandbox))
    }

    pub fn driver(&self) -> SandboxDriver {
        match self {
            Sandbox::Local(_) => SandboxDriver::Local,
            Sandbox::Containerized(_) => SandboxDriver::Containerized,
        }
    }
}

#[async_trait]
impl SandboxExecutor for Sandbox {
    async fn run(&self, code: &str) -> Result<SandboxOutcome> {
        match self {
            Sandbox::Local(sandbox) => sandbox.run(code).await,
            Sandbox::Containerized(sandbox) => sandbox.run(code).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::RecordingRunner;

    #[test]
    fn test_deny_list_reports_first_match() {
        let deny = DenyList::new(&[r"os\.system\(", r"\beval\("]).unwrap();
        assert_eq!(deny.find("x = eval('1')"), Some(r"\beval\("));
        assert_eq!(deny.find("literal_eval(x)"), None);
        assert!(deny.screen("print('hi')").is_none());
        assert_eq!(
            deny.screen("os.system('ls')"),
            Some(SandboxOutcome::Rejected(DENIED_MESSAGE.to_string()))
        );
    }

    #[test]
    fn test_deny_list_rejects_bad_pattern() {
        let err = DenyList::new(&["(open"]).unwrap_err();
        assert!(matches!(err, ConfigError::Pattern { .. }));
    }

    #[test]
    fn test_configured_patterns_override_defaults() {
        let config = SandboxConfig {
            deny_patterns: Some(vec![r"import\s+socket".into()]),
            ..SandboxConfig::default()
        };
        let deny = DenyList::from_config(&config, &[r"os\.system\("]).unwrap();
        assert!(deny.find("os.system('ls')").is_none());
        assert!(deny.find("import socket").is_some());
    }

    #[test]
    fn test_from_config_selects_driver() {
        let runner: Arc<dyn Runner> = Arc::new(RecordingRunner::succeeding(&[]));
        let mut config = SandboxConfig::default();

        let sandbox = Sandbox::from_config(&config, runner.clone()).unwrap().unwrap();
        assert_eq!(sandbox.driver(), SandboxDriver::Local);

        config.driver = SandboxDriver::Containerized;
        let sandbox = Sandbox::from_config(&config, runner.clone()).unwrap().unwrap();
        assert_eq!(sandbox.driver(), SandboxDriver::Containerized);

        config.driver = SandboxDriver::Disabled;
        assert!(Sandbox::from_config(&config, runner).unwrap().is_none());
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = SandboxOutcome::Unavailable("runtime missing".into());
        assert!(!outcome.is_passed());
        assert_eq!(outcome.message(), "runtime missing");
        assert!(SandboxOutcome::Passed(String::new()).is_passed());
    }
}
