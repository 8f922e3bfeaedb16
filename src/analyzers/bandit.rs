//! Bandit adapter
//!
//! Runs `bandit -r <file> -f json -q` on a temporary copy of the snippet
//! and maps each reported result to an issue.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{invoke_tool, json_payload, Analyzer};
use crate::config::BanditConfig;
use crate::core::AnalysisIssue;
use crate::runner::{CommandSpec, RunLimits, Runner};
use crate::snippet::SnippetDir;

const TOOL_NAME: &str = "bandit";
const DEFAULT_MESSAGE: &str = "Bandit security issue detected.";
const DEFAULT_SEVERITY: &str = "MEDIUM";

#[derive(Debug, Default, Deserialize)]
struct BanditReport {
    #[serde(default)]
    results: Vec<BanditResult>,
}

#[derive(Debug, Deserialize)]
struct BanditResult {
    issue_text: Option<String>,
    issue_severity: Option<String>,
}

pub struct BanditAnalyzer {
    config: BanditConfig,
    runner: Arc<dyn Runner>,
}

impl BanditAnalyzer {
    pub fn new(config: BanditConfig, runner: Arc<dyn Runner>) -> Self {
        Self { config, runner }
    }

    fn build_command(&self, binary: String, snippet: &SnippetDir) -> CommandSpec {
        CommandSpec::new(binary)
            .arg("-r")
            .arg(snippet.file().display().to_string())
            .with_args(["-f", "json", "-q"])
            .arg("--severity-level")
            .arg(self.config.severity.to_uppercase())
            .arg("--confidence-level")
            .arg(self.config.confidence.to_uppercase())
    }
}

fn parse_report(stdout: &str) -> Option<Vec<AnalysisIssue>> {
    let report: BanditReport = match serde_json::from_str(json_payload(stdout)) {
        Ok(report) => report,
        Err(e) => {
            debug!("Failed to decode Bandit output: {}", e);
            return None;
        }
    };

    let issues = report
        .results
        .into_iter()
        .map(|result| {
            AnalysisIssue::new(
                TOOL_NAME,
                result.issue_text.unwrap_or_else(|| DEFAULT_MESSAGE.into()),
                result.issue_severity.unwrap_or_else(|| DEFAULT_SEVERITY.into()),
            )
        })
        .collect();
    Some(issues)
}

#[async_trait]
impl Analyzer for BanditAnalyzer {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    async fn analyze(&self, code: &str) -> Vec<AnalysisIssue> {
        let Some(binary) = self.runner.locate(&self.config.binary) else {
            debug!("Bandit binary not available; skipping analysis.");
            return Vec::new();
        };

        let snippet = match SnippetDir::write("bandit-", code) {
            Ok(snippet) => snippet,
            Err(e) => {
                warn!("Bandit snippet setup failed: {:#}", e);
                return Vec::new();
            }
        };

        let cmd = self.build_command(binary.display().to_string(), &snippet);
        let limits = RunLimits::new(Duration::from_secs(self.config.timeout_secs));

        match invoke_tool(self.runner.as_ref(), TOOL_NAME, &cmd, &limits).await {
            Some(stdout) => parse_report(&stdout).unwrap_or_default(),
            None => Vec::new(),
        }
    }
}
