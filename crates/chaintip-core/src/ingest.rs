//! Ingestion pipeline: dedupe, normalize, commit, publish.
//!
//! ```text
//! RawBlock → [regression floor] → [exists?] → BlockRecord::from_raw → insert → publish
//! ```
//!
//! Failures never escape: they are logged with the height and reported as
//! [`SkipReason::Failed`], so the source session keeps going.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::TipError;
use crate::publisher::BlockPublisher;
use crate::store::{BlockStore, InsertOutcome};
use crate::types::{BlockRecord, RawBlock};

/// Why a block was not stored.
#[derive(Debug, Clone)]
pub enum SkipReason {
    /// A record for this height already exists.
    Duplicate,
    /// The height is below the highest stored height minus the gap window.
    BelowFloor { floor: u64 },
    /// Normalization or persistence failed.
    Failed(TipError),
}

/// Result of [`IngestPipeline::ingest`].
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Stored(BlockRecord),
    Skipped { height: u64, reason: SkipReason },
}

impl IngestOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub stored: u64,
    pub duplicates: u64,
    pub below_floor: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    stored: AtomicU64,
    duplicates: AtomicU64,
    below_floor: AtomicU64,
    failed: AtomicU64,
}

/// Highest stored height, loaded from the store on first use.
#[derive(Default)]
struct Tip {
    loaded: bool,
    highest: Option<u64>,
}

struct PipelineInner {
    store: Arc<dyn BlockStore>,
    publisher: BlockPublisher,
    gap_window: Option<u64>,
    tip: Mutex<Tip>,
    counters: Counters,
}

/// Single-writer ingestion pipeline. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct IngestPipeline {
    inner: Arc<PipelineInner>,
}

impl IngestPipeline {
    /// `gap_window`: how far below the highest stored height blocks are still
    /// accepted. `None` disables the floor and relies on the existence check.
    pub fn new(
        store: Arc<dyn BlockStore>,
        publisher: BlockPublisher,
        gap_window: Option<u64>,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                store,
                publisher,
                gap_window,
                tip: Mutex::new(Tip::default()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.inner.store
    }

    pub fn publisher(&self) -> &BlockPublisher {
        &self.inner.publisher
    }

    pub fn stats(&self) -> IngestStats {
        let c = &self.inner.counters;
        IngestStats {
            stored: c.stored.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            below_floor: c.below_floor.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Ingest one block. Publishes to subscribers before returning `Stored`.
    pub async fn ingest(&self, raw: RawBlock) -> IngestOutcome {
        let height = raw.number;
        let outcome = match self.try_ingest(&raw).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(height, error = %e, "failed to store block");
                IngestOutcome::Skipped {
                    height,
                    reason: SkipReason::Failed(e),
                }
            }
        };
        self.count(&outcome);
        outcome
    }

    async fn try_ingest(&self, raw: &RawBlock) -> Result<IngestOutcome, TipError> {
        let height = raw.number;
        let mut tip = self.inner.tip.lock().await;
        if !tip.loaded {
            tip.highest = self.inner.store.latest_height().await?;
            tip.loaded = true;
        }

        if let (Some(window), Some(highest)) = (self.inner.gap_window, tip.highest) {
            let floor = highest.saturating_sub(window);
            if height < floor {
                debug!(height, floor, "block below regression floor");
                return Ok(skipped(height, SkipReason::BelowFloor { floor }));
            }
        }

        if self.inner.store.exists(height).await? {
            debug!(height, "block already stored");
            return Ok(skipped(height, SkipReason::Duplicate));
        }

        let record = BlockRecord::from_raw(raw, Utc::now())?;
        match self.inner.store.insert(&record).await? {
            InsertOutcome::AlreadyExists => {
                debug!(height, "block already stored");
                Ok(skipped(height, SkipReason::Duplicate))
            }
            InsertOutcome::Stored => {
                tip.highest = Some(tip.highest.map_or(height, |h| h.max(height)));
                let receivers = self.inner.publisher.publish(record.clone());
                info!(
                    height,
                    hash = %record.hash,
                    txs = record.transaction_count,
                    receivers,
                    "block stored"
                );
                Ok(IngestOutcome::Stored(record))
            }
        }
    }

    fn count(&self, outcome: &IngestOutcome) {
        let c = &self.inner.counters;
        let counter = match outcome {
            IngestOutcome::Stored(_) => &c.stored,
            IngestOutcome::Skipped { reason, .. } => match reason {
                SkipReason::Duplicate => &c.duplicates,
                SkipReason::BelowFloor { .. } => &c.below_floor,
                SkipReason::Failed(_) => &c.failed,
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn skipped(height: u64, reason: SkipReason) -> IngestOutcome {
    IngestOutcome::Skipped { height, reason }
}
