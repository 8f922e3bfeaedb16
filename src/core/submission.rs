use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::SubmissionStatus;

pub type SubmissionId = Uuid;

/// Maximum length of the optional user handle
pub const MAX_USER_HANDLE_LEN: usize = 64;

/// One discrete finding from an analyzer or the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisIssue {
    /// Name of the adapter that produced the finding
    pub tool: String,
    pub message: String,
    /// Free-form severity, kept verbatim from the tool (e.g. info, low, HIGH)
    pub severity: String,
}

impl AnalysisIssue {
    pub fn new(
        tool: impl Into<String>,
        message: impl Into<String>,
        severity: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
            severity: severity.into(),
        }
    }
}

/// Outcome of one scoring pass. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScoringResult {
    pub status: SubmissionStatus,
    pub score: Option<u32>,
    pub feedback: Option<String>,
    pub issues: Vec<AnalysisIssue>,
}

impl ScoringResult {
    pub fn graded(status: SubmissionStatus, score: u32, feedback: impl Into<String>) -> Self {
        Self {
            status,
            score: Some(score),
            feedback: Some(feedback.into()),
            issues: Vec::new(),
        }
    }
}

/// A scored attempt at fixing one challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub challenge_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
    pub code: String,
    pub status: SubmissionStatus,
    pub score: Option<u32>,
    pub feedback: Option<String>,
    #[serde(default)]
    pub issues: Vec<AnalysisIssue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rejected at creation time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSubmission {
    #[error("code must not be empty")]
    EmptyCode,
    #[error("user handle exceeds {} characters", MAX_USER_HANDLE_LEN)]
    HandleTooLong,
}

impl Submission {
    /// Create a new `pending` submission
    pub fn new(
        challenge_slug: impl Into<String>,
        code: impl Into<String>,
        user_handle: Option<String>,
    ) -> Result<Self, InvalidSubmission> {
        let code = code.into();
        if code.is_empty() {
            return Err(InvalidSubmission::EmptyCode);
        }
        if user_handle
            .as_deref()
            .is_some_and(|h| h.chars().count() > MAX_USER_HANDLE_LEN)
        {
            return Err(InvalidSubmission::HandleTooLong);
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            challenge_slug: challenge_slug.into(),
            user_handle,
            code,
            status: SubmissionStatus::Pending,
            score: None,
            feedback: None,
            issues: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn mark_running(&mut self) {
        self.status = SubmissionStatus::Running;
        self.touch();
    }

    /// Copy the fields of a scoring pass onto the record
    pub fn apply(&mut self, result: ScoringResult) {
        self.status = result.status;
        self.score = result.score;
        self.feedback = result.feedback;
        self.issues = result.issues;
        self.touch();
    }

    /// Record a fault that escaped the orchestrator
    pub fn mark_error(&mut self, fault: &str) {
        self.status = SubmissionStatus::Error;
        self.score = None;
        self.feedback = Some(format!("Scoring failure: {}", fault));
        self.issues = vec![AnalysisIssue::new("scoring", fault, "error")];
        self.touch();
    }

    /// Reset for a rescore, optionally replacing the code first
    pub fn reset_for_rescore(&mut self, code: Option<String>) {
        if let Some(code) = code {
            self.code = code;
        }
        self.status = SubmissionStatus::Pending;
        self.score = None;
        self.feedback = None;
        self.issues.clear();
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_submission_is_pending() {
        let sub = Submission::new("sqli_001", "print('fixed')", Some("tester".into())).unwrap();
        assert_eq!(sub.status, SubmissionStatus::Pending);
        assert!(sub.score.is_none());
        assert!(sub.issues.is_empty());
        assert_eq!(sub.created_at, sub.updated_at);
    }

    #[test]
    fn test_new_submission_validation() {
        assert_eq!(
            Submission::new("sqli_001", "", None).unwrap_err(),
            InvalidSubmission::EmptyCode
        );
        let handle = "x".repeat(MAX_USER_HANDLE_LEN + 1);
        assert_eq!(
            Submission::new("sqli_001", "pass", Some(handle)).unwrap_err(),
            InvalidSubmission::HandleTooLong
        );
    }

    #[test]
    fn test_mark_error_clears_score() {
        let mut sub = Submission::new("sqli_001", "pass", None).unwrap();
        sub.score = Some(80);
        sub.mark_error("boom");
        assert_eq!(sub.status, SubmissionStatus::Error);
        assert!(sub.score.is_none());
        assert_eq!(sub.feedback.as_deref(), Some("Scoring failure: boom"));
        assert_eq!(sub.issues, vec![AnalysisIssue::new("scoring", "boom", "error")]);
    }

    #[test]
    fn test_reset_for_rescore_clears_results() {
        let mut sub = Submission::new("sqli_001", "old", None).unwrap();
        sub.apply(ScoringResult {
            status: SubmissionStatus::Failed,
            score: Some(0),
            feedback: Some("bad".into()),
            issues: vec![AnalysisIssue::new("bandit", "B608", "MEDIUM")],
        });

        sub.reset_for_rescore(Some("new".into()));

        assert_eq!(sub.code, "new");
        assert_eq!(sub.status, SubmissionStatus::Pending);
        assert!(sub.score.is_none());
        assert!(sub.feedback.is_none());
        assert!(sub.issues.is_empty());
        assert!(sub.updated_at >= sub.created_at);
    }
}
