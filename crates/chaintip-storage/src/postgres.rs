//! PostgreSQL block store.
//!
//! # Feature Flag
//! Requires the `postgres` feature:
//! ```toml
//! chaintip-storage = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! # Schema
//! `block_headers` is created on first connect, one row per block height.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use chaintip_core::{BlockRecord, BlockStore, InsertOutcome, TipError};

fn storage_err(e: sqlx::Error) -> TipError {
    TipError::Persistence(e.to_string())
}

fn to_i64(height: u64) -> Result<i64, TipError> {
    i64::try_from(height).map_err(|_| TipError::Persistence(format!("height {height} exceeds BIGINT")))
}

/// Connection options for the Postgres backend.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 5)
    pub max_connections: u32,
    /// Connection acquire timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

/// PostgreSQL-backed [`BlockStore`]. Cheap to clone.
#[derive(Clone)]
pub struct PostgresBlockStore {
    pool: PgPool,
}

impl PostgresBlockStore {
    /// Connect with default options and create the schema.
    ///
    /// `postgresql://[user[:password]@][host][:port][/dbname]`
    pub async fn connect(database_url: &str) -> Result<Self, TipError> {
        Self::connect_with_options(database_url, PostgresOptions::default()).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        opts: PostgresOptions,
    ) -> Result<Self, TipError> {
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .acquire_timeout(Duration::from_secs(opts.connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| TipError::Persistence(format!("postgres connect: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(url = %crate::redact(database_url), "postgres block store connected");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), TipError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS block_headers (
                block_number      BIGINT      PRIMARY KEY,
                timestamp         TIMESTAMPTZ NOT NULL,
                hash              TEXT        NOT NULL,
                transaction_count INTEGER     NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> Result<BlockRecord, sqlx::Error> {
    Ok(BlockRecord {
        height: row.try_get::<i64, _>("block_number")? as u64,
        observed_at: row.try_get::<DateTime<Utc>, _>("timestamp")?,
        hash: row.try_get("hash")?,
        transaction_count: row.try_get::<i32, _>("transaction_count")? as u32,
    })
}

#[async_trait]
impl BlockStore for PostgresBlockStore {
    async fn exists(&self, height: u64) -> Result<bool, TipError> {
        let row = sqlx::query("SELECT 1 FROM block_headers WHERE block_number = $1")
            .bind(to_i64(height)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.is_some())
    }

    async fn insert(&self, record: &BlockRecord) -> Result<InsertOutcome, TipError> {
        let count = i32::try_from(record.transaction_count)
            .map_err(|_| TipError::Persistence("transaction count exceeds INTEGER".into()))?;
        let result = sqlx::query(
            "INSERT INTO block_headers (block_number, timestamp, hash, transaction_count)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (block_number) DO NOTHING",
        )
        .bind(to_i64(record.height)?)
        .bind(record.observed_at)
        .bind(&record.hash)
        .bind(count)
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
             FROM block_headers ORDER BY block_number DESC LIMIT $1",
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

#[cfg(test)]
mod tests {
    // Integration tests require a running PostgreSQL instance.
    // Example: DATABASE_URL=postgresql://localhost/chaintip_test cargo test --features postgres -- --ignored

    use super::*;

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn insert_is_idempotent() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PostgresBlockStore::connect(&url).await.unwrap();
        sqlx::query("DELETE FROM block_headers WHERE block_number >= 9000000000")
            .execute(&store.pool)
            .await
            .unwrap();

        let record = BlockRecord {
            height: 9_000_000_042,
            observed_at: Utc::now(),
            hash: "0xabc".into(),
            transaction_count: 3,
        };
        assert_eq!(store.insert(&record).await.unwrap(), InsertOutcome::Stored);
        assert_eq!(store.insert(&record).await.unwrap(), InsertOutcome::AlreadyExists);
        assert!(store.exists(9_000_000_042).await.unwrap());
        assert_eq!(store.latest_height().await.unwrap(), Some(9_000_000_042));
        assert_eq!(store.list_recent(1).await.unwrap()[0].transaction_count, 3);
        store.close().await;
    }
}
