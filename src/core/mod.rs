//! Core data model shared by every stage of the scoring pipeline

pub mod status;
pub mod submission;

pub use status::SubmissionStatus;
pub use submission::{AnalysisIssue, InvalidSubmission, ScoringResult, Submission, SubmissionId};
