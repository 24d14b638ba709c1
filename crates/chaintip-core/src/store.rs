//! The block store contract and an in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::TipError;
use crate::types::BlockRecord;

/// Outcome of [`BlockStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was committed.
    Stored,
    /// A record with the same height already existed; nothing was written.
    AlreadyExists,
}

/// Durable storage for block headers, keyed by height.
///
/// Implementations include [`MemoryBlockStore`] and the SQLite / Postgres
/// backends in `chaintip-storage`.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Returns `true` if a record for `height` exists.
    async fn exists(&self, height: u64) -> Result<bool, TipError>;

    /// Atomically insert `record`. Inserting an existing height is not an error.
    async fn insert(&self, record: &BlockRecord) -> Result<InsertOutcome, TipError>;

    /// Highest committed height, if any.
    async fn latest_height(&self) -> Result<Option<u64>, TipError>;

    /// Up to `limit` records, highest height first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<BlockRecord>, TipError>;

    /// Release the backing resources.
    async fn close(&self) {}
}

// ─── In-memory store ──────────────────────────────────────────────────────────

/// In-memory block store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryBlockStore {
    records: Mutex<BTreeMap<u64, BlockRecord>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<u64, BlockRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored heights in ascending order.
    pub fn heights(&self) -> Vec<u64> {
        self.records().keys().copied().collect()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn exists(&self, height: u64) -> Result<bool, TipError> {
        Ok(self.records().contains_key(&height))
    }

    async fn insert(&self, record: &BlockRecord) -> Result<InsertOutcome, TipError> {
        let mut records = self.records();
        if records.contains_key(&record.height) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        records.insert(record.height, record.clone());
        Ok(InsertOutcome::Stored)
    }

    async fn latest_height(&self) -> Result<Option<u64>, TipError> {
        Ok(self.records().keys().next_back().copied())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<BlockRecord>, TipError> {
        Ok(self.records().values().rev().take(limit).cloned().collect())
    }
}
