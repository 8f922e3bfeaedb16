//! Scoring orchestrator
//!
//! Composes one scoring pass: static analyzers, the challenge rule, then
//! the sandbox. The sandbox can only lower the outcome. It has no
//! knowledge of the queue or persistence.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analyzers::{build_analyzers, Analyzer};
use crate::config::{ScoringConfig, Settings};
use crate::core::{AnalysisIssue, ScoringResult, Submission, SubmissionStatus};
use crate::error::ConfigError;
use crate::rules::RuleEngine;
use crate::runner::Runner;
use crate::sandbox::{Sandbox, SandboxExecutor};

/// Tool name stamped on sandbox-sourced issues
pub const SANDBOX_TOOL: &str = "sandbox";

pub struct ScoringService {
    analyzers: Vec<Box<dyn Analyzer>>,
    rules: RuleEngine,
    sandbox: Option<Box<dyn SandboxExecutor>>,
    policy: ScoringConfig,
}

impl ScoringService {
    pub fn new(
        analyzers: Vec<Box<dyn Analyzer>>,
        rules: RuleEngine,
        sandbox: Option<Box<dyn SandboxExecutor>>,
        policy: ScoringConfig,
    ) -> Self {
        Self {
            analyzers,
            rules,
            sandbox,
            policy,
        }
    }

    /// Wire analyzers, rules and the configured sandbox from settings
    pub fn from_settings(settings: &Settings, runner: Arc<dyn Runner>) -> Result<Self, ConfigError> {
        let analyzers = build_analyzers(&settings.analyzers, runner.clone());
        let sandbox = Sandbox::from_config(&settings.sandbox, runner)?;
        match sandbox.as_ref().map(Sandbox::driver) {
            Some(driver) => info!(
                "Scoring service ready: {} analyzer(s), {:?} sandbox",
                analyzers.len(),
                driver
            ),
            None => info!(
                "Scoring service ready: {} analyzer(s), sandbox disabled",
                analyzers.len()
            ),
        }
        let sandbox = sandbox.map(|s| Box::new(s) as Box<dyn SandboxExecutor>);
        Ok(Self::new(
            analyzers,
            RuleEngine::new(settings.scoring),
            sandbox,
            settings.scoring,
        ))
    }

    /// Run one full scoring pass for `submission`
    pub async fn score(&self, submission: &Submission) -> ScoringResult {
        let code = submission.code.as_str();

        let mut issues = Vec::new();
        for analyzer in &self.analyzers {
            let found = analyzer.analyze(code).await;
            debug!("{} reported {} issue(s)", analyzer.name(), found.len());
            issues.extend(found);
        }

        let mut result = self.rules.evaluate(&submission.challenge_slug, code);
        let mut notes: Vec<String> = result.feedback.take().into_iter().collect();

        if let Some(sandbox) = &self.sandbox {
            match sandbox.run(code).await {
                Ok(outcome) if outcome.is_passed() => {
                    if !outcome.message().is_empty() {
                        issues.push(AnalysisIssue::new(SANDBOX_TOOL, outcome.message(), "info"));
                    }
                }
                Ok(outcome) => {
                    debug!("Sandbox did not pass {}: {:?}", submission.id, outcome);
                    let message = outcome.message().to_string();
                    // An ungraded pass (no rule) still ends with a score once failed
                    let score = result.score.unwrap_or(self.policy.zero_score);
                    result.status = SubmissionStatus::Failed;
                    result.score = Some(score.min(self.policy.sandbox_failure_ceiling));
                    notes.push(message.clone());
                    issues.push(AnalysisIssue::new(SANDBOX_TOOL, message, "high"));
                }
                Err(e) => {
                    let fault = format!("{:#}", e);
                    warn!("Sandbox fault while scoring {}: {}", submission.id, fault);
                    issues.push(AnalysisIssue::new(SANDBOX_TOOL, fault.clone(), "error"));
                    return ScoringResult {
                        status: SubmissionStatus::Error,
                        score: None,
                        feedback: Some(format!("Sandbox execution error: {}", fault)),
                        issues,
                    };
                }
            }
        }

        if let Some(findings) = render_findings(&issues) {
            notes.push(findings);
        }
        result.feedback = (!notes.is_empty()).then(|| notes.join("\n\n"));
        result.issues = issues;
        result
    }
}

/// Bullet list of the non-sandbox issues, `None` when there are none
fn render_findings(issues: &[AnalysisIssue]) -> Option<String> {
    let lines: Vec<String> = issues
        .iter()
        .filter(|issue| issue.tool != SANDBOX_TOOL)
        .map(|issue| format!("- [{}/{}] {}", issue.tool, issue.severity, issue.message))
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(format!("Static analysis findings:\n{}", lines.join("\n")))
}
