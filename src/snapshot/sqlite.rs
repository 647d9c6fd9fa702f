// src/snapshot/sqlite.rs
// SQLite snapshot log. One row per successful aggregation; rows are never
// updated or deleted. Source records are stored as JSON text.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::instrument;

use super::{Snapshot, SnapshotAck, SnapshotSink, StorageError};
use crate::aggregate::AggregationResult;

pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS aggregated_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                crypto TEXT,
                weather TEXT,
                news TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_aggregated_created_at ON aggregated_data(created_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM aggregated_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<(SnapshotAck, Snapshot)>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, created_at, crypto, weather, news FROM aggregated_data ORDER BY id DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl SnapshotSink for SqliteSnapshotStore {
    #[instrument(skip_all, fields(repo = "snapshots", operation = "append"))]
    async fn append(&self, snapshot: &Snapshot) -> Result<SnapshotAck, StorageError> {
        let r = &snapshot.result;
        let done = sqlx::query(
            "INSERT INTO aggregated_data (created_at, crypto, weather, news) VALUES ($1, $2, $3, $4)",
        )
        .bind(snapshot.created_at.timestamp_millis())
        .bind(encode(&r.crypto)?)
        .bind(encode(&r.weather)?)
        .bind(encode(&r.latest_news)?)
        .execute(&self.pool)
        .await?;

        Ok(SnapshotAck {
            id: done.last_insert_rowid(),
        })
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

fn encode<T: Serialize>(value: &Option<T>) -> Result<Option<String>, StorageError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StorageError::from)
}

fn decode<T: DeserializeOwned>(id: i64, raw: Option<String>) -> Result<Option<T>, StorageError> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| StorageError::Corrupt {
            id,
            reason: e.to_string(),
        })
}

fn decode_row(row: &SqliteRow) -> Result<(SnapshotAck, Snapshot), StorageError> {
    let id: i64 = row.try_get("id")?;
    let created_ms: i64 = row.try_get("created_at")?;
    let created_at = DateTime::from_timestamp_millis(created_ms).ok_or_else(|| {
        StorageError::Corrupt {
            id,
            reason: format!("created_at {created_ms} out of range"),
        }
    })?;

    let snapshot = Snapshot {
        created_at,
        result: AggregationResult {
            crypto: decode(id, row.try_get("crypto")?)?,
            weather: decode(id, row.try_get("weather")?)?,
            latest_news: decode(id, row.try_get("news")?)?,
        },
    };
    Ok((SnapshotAck { id }, snapshot))
}
