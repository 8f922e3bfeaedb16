//! Analyzers module - External static-analysis adapters
//!
//! Each adapter wraps one scanning tool:
//! - `SemgrepAnalyzer`: semgrep with local rule files
//! - `BanditAnalyzer`: bandit security checks
//!
//! Adapters never fail to the caller. A missing binary, a timeout, an
//! unexpected exit code or unparseable output all yield no findings.

pub mod bandit;
pub mod semgrep;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AnalyzersConfig;
use crate::core::AnalysisIssue;
use crate::runner::{CommandSpec, RunLimits, RunStatus, Runner};

pub use bandit::BanditAnalyzer;
pub use semgrep::SemgrepAnalyzer;

/// One static-analysis tool
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Fixed tool name stamped on every issue
    fn name(&self) -> &'static str;

    async fn analyze(&self, code: &str) -> Vec<AnalysisIssue>;
}

/// Build the enabled analyzers in their configured order
pub fn build_analyzers(config: &AnalyzersConfig, runner: Arc<dyn Runner>) -> Vec<Box<dyn Analyzer>> {
    let mut analyzers: Vec<Box<dyn Analyzer>> = Vec::new();
    if config.semgrep.enabled {
        analyzers.push(Box::new(SemgrepAnalyzer::new(
            config.semgrep.clone(),
            runner.clone(),
        )));
    }
    if config.bandit.enabled {
        analyzers.push(Box::new(BanditAnalyzer::new(config.bandit.clone(), runner)));
    }
    analyzers
}

/// Run a scanner and return its stdout when it exited with 0 or 1
async fn invoke_tool(
    runner: &dyn Runner,
    tool: &str,
    cmd: &CommandSpec,
    limits: &RunLimits,
) -> Option<String> {
    let outcome = match runner.run(cmd, limits).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("{} invocation failed: {:#}", tool, e);
            return None;
        }
    };

    match outcome.status {
        // 0 = no issues, 1 = issues found
        RunStatus::Exited(0) | RunStatus::Exited(1) => Some(outcome.stdout),
        RunStatus::Exited(code) => {
            debug!(
                "{} returned non-success exit code {}: {}",
                tool,
                code,
                outcome.stderr.trim()
            );
            None
        }
        RunStatus::TimedOut => {
            warn!("{} timed out after {:?}", tool, limits.timeout);
            None
        }
        RunStatus::Signaled(sig) => {
            warn!("{} was killed by signal {}", tool, sig);
            None
        }
    }
}

/// Empty output is an empty report
fn json_payload(stdout: &str) -> &str {
    if stdout.trim().is_empty() {
        "{}"
    } else {
        stdout
    }
}
