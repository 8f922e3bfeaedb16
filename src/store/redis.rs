//! Redis-backed persistence and the inbound submission-id queue
//!
//! Records are JSON documents at `scoring:submission:<id>`. The request
//! layer pushes submission ids onto a list that `RedisQueue` drains with
//! a BLPOP bounded by `BLPOP_TIMEOUT_SECS`. Connection failures are retried
//! until Redis comes back.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{SubmissionQueue, SubmissionStore};
use crate::core::{Submission, SubmissionId};
use crate::error::StoreError;

/// Redis key constants
pub mod keys {
    /// Submission record key prefix
    pub const SUBMISSION_PREFIX: &str = "scoring:submission:";
}

const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Upper bound on one BLPOP wait
pub const BLPOP_TIMEOUT_SECS: f64 = 1.0;

pub fn submission_key(id: SubmissionId) -> String {
    format!("{}{}", keys::SUBMISSION_PREFIX, id)
}

/// Submission records stored in Redis
pub struct RedisStore {
    client: redis::Client,
    conn: RwLock<MultiplexedConnection>,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = get_connection_with_retry(&client).await;
        info!("Submission store connected to Redis at {}", redis_url);
        Ok(Self {
            client,
            conn: RwLock::new(conn),
        })
    }

    /// Fresh handle on the shared multiplexed connection
    async fn handle(&self) -> MultiplexedConnection {
        self.conn.read().await.clone()
    }

    async fn reconnect(&self) {
        let conn = get_connection_with_retry(&self.client).await;
        *self.conn.write().await = conn;
    }
}

#[async_trait]
impl SubmissionStore for RedisStore {
    async fn load(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        let key = submission_key(id);

        let raw: Option<String> = match self.handle().await.get::<_, Option<String>>(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to load {}: {}. Reconnecting...", key, e);
                self.reconnect().await;
                self.handle().await.get::<_, Option<String>>(&key).await?
            }
        };

        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    async fn save(&self, submission: &Submission) -> Result<(), StoreError> {
        let key = submission_key(submission.id);
        let json = serde_json::to_string(submission)?;

        if let Err(e) = self.handle().await.set::<_, _, ()>(&key, &json).await {
            warn!("Failed to store {}: {}. Reconnecting...", key, e);
            self.reconnect().await;
            self.handle().await.set::<_, _, ()>(&key, &json).await?;
        }
        Ok(())
    }
}

/// Consumer side of the request layer's submission-id list
pub struct RedisQueue {
    client: redis::Client,
    conn: MultiplexedConnection,
    key: String,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = get_connection_with_retry(&client).await;
        let key = key.into();
        info!("Listening for submissions on {}", key);
        Ok(Self { client, conn, key })
    }

}

#[async_trait]
impl SubmissionQueue for RedisQueue {
    /// Entries that are not UUIDs are logged and dropped
    async fn next_id(&mut self) -> Option<SubmissionId> {
        let result: Option<(String, String)> =
            match self.conn.blpop(&self.key, BLPOP_TIMEOUT_SECS).await {
                Ok(res) => res,
                Err(e) => {
                    warn!("Redis BLPOP failed: {}. Reconnecting...", e);
                    self.conn = get_connection_with_retry(&self.client).await;
                    return None;
                }
            };

        let (_, raw) = result?;
        let id = parse_queue_entry(&raw);
        if id.is_none() {
            warn!("Ignoring malformed queue entry: {}", raw);
        }
        id
    }
}

/// Accepts a bare UUID or a quoted JSON string
fn parse_queue_entry(raw: &str) -> Option<SubmissionId> {
    let trimmed = raw.trim().trim_matches('"');
    Uuid::parse_str(trimmed).ok()
}

/// Get a Redis connection with retry logic
async fn get_connection_with_retry(client: &redis::Client) -> MultiplexedConnection {
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return conn,
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in {} seconds...",
                    e,
                    RECONNECT_DELAY.as_secs()
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_key_format() {
        let id = Uuid::parse_str("6f1c2a34-9d7e-4b1a-8c55-0e2f3a4b5c6d").unwrap();
        assert_eq!(
            submission_key(id),
            "scoring:submission:6f1c2a34-9d7e-4b1a-8c55-0e2f3a4b5c6d"
        );
    }

    #[test]
    fn test_parse_queue_entry() {
        let id = Uuid::new_v4();
        assert_eq!(parse_queue_entry(&id.to_string()), Some(id));
        assert_eq!(parse_queue_entry(&format!("\"{}\"\n", id)), Some(id));
        assert_eq!(parse_queue_entry("not-a-uuid"), None);
    }

    #[test]
    fn test_record_round_trips_as_json_document() {
        let submission = Submission::new("cmdi_001", "subprocess.run(['ls'])", Some("ada".into()))
            .unwrap();
        let json = serde_json::to_string(&submission).unwrap();
        let decoded: Submission = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, submission);
    }

    #[test]
    fn test_invalid_url_is_a_store_error() {
        let err = tokio_test::block_on(RedisStore::connect("not a url")).err().unwrap();
        assert!(matches!(err, StoreError::Redis(_)));
    }
}
