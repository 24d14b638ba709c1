//! SQLite block store.
//!
//! # Usage
//! ```rust,no_run
//! use chaintip_storage::sqlite::SqliteBlockStore;
//!
//! # async fn example() -> Result<(), chaintip_core::TipError> {
//! // File-backed, created if missing
//! let store = SqliteBlockStore::open("sqlite:blocks.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteBlockStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use chaintip_core::{BlockRecord, BlockStore, InsertOutcome, TipError};

fn storage_err(e: sqlx::Error) -> TipError {
    TipError::Persistence(e.to_string())
}

fn to_i64(height: u64) -> Result<i64, TipError> {
    i64::try_from(height).map_err(|_| TipError::Persistence(format!("height {height} exceeds i64")))
}

/// SQLite-backed [`BlockStore`].
#[derive(Clone)]
pub struct SqliteBlockStore {
    pool: SqlitePool,
}

impl SqliteBlockStore {
    /// Open (or create) the database at `url` (`sqlite:path` or
    /// `sqlite::memory:`) and create the schema.
    pub async fn open(url: &str) -> Result<Self, TipError> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(storage_err)?
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // every connection to `:memory:` gets its own database, so keep
        // exactly one alive for the lifetime of the pool
        let mut pool_options = SqlitePoolOptions::new().max_connections(4);
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(url, "sqlite block store opened");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self, TipError> {
        Self::open("sqlite::memory:").await
    }

    async fn init_schema(&self) -> Result<(), TipError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS block_headers (
                block_number      INTEGER PRIMARY KEY,
                timestamp         TEXT    NOT NULL,
                hash              TEXT    NOT NULL,
                transaction_count INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

fn record_from_row(row: &SqliteRow) -> Result<BlockRecord, sqlx::Error> {
    Ok(BlockRecord {
        height: row.try_get::<i64, _>("block_number")? as u64,
        observed_at: row.try_get::<DateTime<Utc>, _>("timestamp")?,
        hash: row.try_get("hash")?,
        transaction_count: row.try_get::<i64, _>("transaction_count")? as u32,
    })
}

#[async_trait]
impl BlockStore for SqliteBlockStore {
    async fn exists(&self, height: u64) -> Result<bool, TipError> {
        let row = sqlx::query("SELECT 1 FROM block_headers WHERE block_number = ?")
            .bind(to_i64(height)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.is_some())
    }

    async fn insert(&self, record: &BlockRecord) -> Result<InsertOutcome, TipError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO block_headers (block_number, timestamp, hash, transaction_count)
             VALUES (?, ?, ?, ?)",
        )
        .bind(to_i64(record.height)?)
        .bind(record.observed_at)
        .bind(&record.hash)
        .bind(i64::from(record.transaction_count))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            debug!(height = record.height, "block header already present");
            return Ok(InsertOutcome::AlreadyExists);
        }
        Ok(InsertOutcome::Stored)
    }

    async fn latest_height(&self) -> Result<Option<u64>, TipError> {
        let row = sqlx::query("SELECT MAX(block_number) AS height FROM block_headers")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        let height: Option<i64> = row.try_get("height").map_err(storage_err)?;
        Ok(height.map(|h| h as u64))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<BlockRecord>, TipError> {
        let rows = sqlx::query(
            "SELECT block_number, timestamp, hash, transaction_count
             FROM block_headers ORDER BY block_number DESC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| record_from_row(row).map_err(storage_err))
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
