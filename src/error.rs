use thiserror::Error;

use crate::core::{SubmissionId, SubmissionStatus};

/// Failures of the persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures while loading or validating settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid deny pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Failures surfaced to callers of the worker's inbound operations
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Submission {0} not found")]
    NotFound(SubmissionId),

    #[error("Submission {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: SubmissionId,
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
