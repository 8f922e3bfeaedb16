//! Store module - Submission persistence boundary
//!
//! The worker reads and writes submission records only through
//! `SubmissionStore`:
//! - `MemoryStore`: process-local map for tests and embedding hosts
//! - `RedisStore`: one JSON document per submission
//!
//! Inbound ids arrive through a `SubmissionQueue` (`RedisQueue` in
//! production).
//!
//! The store module does NOT:
//! - Enforce status transitions (the worker does)
//! - Lock records across writers

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::core::{Submission, SubmissionId};
use crate::error::StoreError;

pub use memory::MemoryStore;
pub use self::redis::{RedisQueue, RedisStore};

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Fetch a record, `None` when it does not exist
    async fn load(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError>;

    /// Insert or overwrite a record
    async fn save(&self, submission: &Submission) -> Result<(), StoreError>;
}

/// Source of submission ids to score
#[async_trait]
pub trait SubmissionQueue: Send {
    /// Wait a bounded time for the next id, `None` when none arrived.
    ///
    /// Must return rather than block forever so callers can check for shutdown.
    async fn next_id(&mut self) -> Option<SubmissionId>;
}
