// src/snapshot/mod.rs
//! Append-only snapshot sink. The aggregation join writes one snapshot per
//! successful call and never reads them back.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregationResult;

pub use memory::MemorySnapshotStore;
pub use sqlite::SqliteSnapshotStore;

/// Timestamped copy of one composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub created_at: DateTime<Utc>,
    pub result: AggregationResult,
}

impl Snapshot {
    pub fn new(result: AggregationResult) -> Self {
        Self {
            created_at: Utc::now(),
            result,
        }
    }
}

/// Acknowledgement of a durable write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotAck {
    pub id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("stored snapshot {id} is corrupt: {reason}")]
    Corrupt { id: i64, reason: String },

    #[error("{0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn append(&self, snapshot: &Snapshot) -> Result<SnapshotAck, StorageError>;
    fn name(&self) -> &'static str;
}
