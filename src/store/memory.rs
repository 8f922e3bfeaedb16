use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::SubmissionStore;
use crate::core::{Submission, SubmissionId};
use crate::error::StoreError;

/// In-process submission store
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<SubmissionId, Submission>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn load(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn save(&self, submission: &Submission) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(submission.id, submission.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SubmissionStatus;
    use tokio_test::assert_ok;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        let mut submission = Submission::new("sqli_001", "print(1)", None).unwrap();
        assert_ok!(store.save(&submission).await);

        submission.mark_running();
        assert_ok!(store.save(&submission).await);

        let loaded = store.load(submission.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SubmissionStatus::Running);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_record_and_overwrite() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());

        let mut submission = Submission::new("xss_001", "escape(x)", None).unwrap();
        store.save(&submission).await.unwrap();
        submission.reset_for_rescore(Some("html.escape(x)".into()));
        store.save(&submission).await.unwrap();

        assert_eq!(store.len().await, 1);
        let loaded = store.load(submission.id).await.unwrap().unwrap();
        assert_eq!(loaded.code, "html.escape(x)");
    }
}
