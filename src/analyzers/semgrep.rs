//! Semgrep adapter
//!
//! Runs `semgrep scan --json` with the configured local rule files.
//! Rule paths that do not exist are skipped; with no usable rules the
//! tool is not invoked at all.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{invoke_tool, json_payload, Analyzer};
use crate::config::SemgrepConfig;
use crate::core::AnalysisIssue;
use crate::runner::{CommandSpec, RunLimits, Runner};
use crate::snippet::SnippetDir;

const TOOL_NAME: &str = "semgrep";
const DEFAULT_MESSAGE: &str = "Semgrep rule triggered.";
const DEFAULT_SEVERITY: &str = "info";

#[derive(Debug, Default, Deserialize)]
struct SemgrepReport {
    #[serde(default)]
    results: Vec<SemgrepFinding>,
}

#[derive(Debug, Deserialize)]
struct SemgrepFinding {
    #[serde(default)]
    extra: SemgrepExtra,
}

#[derive(Debug, Default, Deserialize)]
struct SemgrepExtra {
    message: Option<String>,
    severity: Option<String>,
}

pub struct SemgrepAnalyzer {
    config: SemgrepConfig,
    runner: Arc<dyn Runner>,
}

impl SemgrepAnalyzer {
    pub fn new(config: SemgrepConfig, runner: Arc<dyn Runner>) -> Self {
        Self { config, runner }
    }

    fn build_command(&self, binary: String, rules: &[String], snippet: &SnippetDir) -> CommandSpec {
        let mut cmd = CommandSpec::new(binary).with_args([
            "scan",
            "--disable-version-check",
            "--quiet",
            "--json",
        ]);
        for rule in rules {
            cmd = cmd.arg("--config").arg(rule.clone());
        }
        cmd.arg(snippet.file().display().to_string())
    }

    fn usable_rules(&self) -> Vec<String> {
        self.config
            .rules
            .iter()
            .filter(|rule| {
                let exists = rule.exists();
                if !exists {
                    debug!("Semgrep rule missing: {}", rule.display());
                }
                exists
            })
            .map(|rule| rule.display().to_string())
            .collect()
    }
}

fn parse_report(stdout: &str) -> Option<Vec<AnalysisIssue>> {
    let report: SemgrepReport = match serde_json::from_str(json_payload(stdout)) {
        Ok(report) => report,
        Err(e) => {
            debug!("Failed to decode Semgrep output: {}", e);
            return None;
        }
    };

    Some(
        report
            .results
            .into_iter()
            .map(|finding| {
                AnalysisIssue::new(
                    TOOL_NAME,
                    finding.extra.message.unwrap_or_else(|| DEFAULT_MESSAGE.into()),
                    finding
                        .extra
                        .severity
                        .unwrap_or_else(|| DEFAULT_SEVERITY.into()),
                )
            })
            .collect(),
    )
}

#[async_trait]
impl Analyzer for SemgrepAnalyzer {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    async fn analyze(&self, code: &str) -> Vec<AnalysisIssue> {
        if self.config.rules.is_empty() {
            return Vec::new();
        }

        let Some(binary) = self.runner.locate(&self.config.binary) else {
            debug!("Semgrep binary not available; skipping analysis.");
            return Vec::new();
        };

        let rules = self.usable_rules();
        if rules.is_empty() {
            debug!("No Semgrep rules available; skipping analysis.");
            return Vec::new();
        }

        let snippet = match SnippetDir::write("semgrep-", code) {
            Ok(snippet) => snippet,
            Err(e) => {
                warn!("Semgrep snippet setup failed: {:#}", e);
                return Vec::new();
            }
        };

        let cmd = self.build_command(binary.display().to_string(), &rules, &snippet);
        let limits = RunLimits::new(Duration::from_secs(self.config.timeout_secs));

        invoke_tool(self.runner.as_ref(), TOOL_NAME, &cmd, &limits)
            .await
            .and_then(|stdout| parse_report(&stdout))
            .unwrap_or_default()
    }
}
