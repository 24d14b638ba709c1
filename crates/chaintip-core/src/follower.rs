//! Tip follower: one pass over the endpoint pool.
//!
//! ```text
//! begin_cycle
//!   ├─ subscription endpoints, in order ─┐
//!   └─ polling endpoints, in order ──────┤
//!                                        ├─ open → stream → ingest each block
//!                                        └─ stream ended → record failure → next
//! both lists exhausted → PoolExhausted
//! ```

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::TipError;
use crate::ingest::IngestPipeline;
use crate::pool::{EndpointHandle, EndpointPool, TransportMode};
use crate::source::BlockSource;

/// How a single endpoint session ended.
enum SessionEnd {
    Cancelled,
    Terminated,
}

/// Drives block sources over the pool and feeds the ingestion pipeline.
pub struct TipFollower {
    pool: Arc<EndpointPool>,
    subscription: Arc<dyn BlockSource>,
    polling: Arc<dyn BlockSource>,
    pipeline: IngestPipeline,
}

impl TipFollower {
    pub fn new(
        pool: Arc<EndpointPool>,
        subscription: Arc<dyn BlockSource>,
        polling: Arc<dyn BlockSource>,
        pipeline: IngestPipeline,
    ) -> Self {
        Self {
            pool,
            subscription,
            polling,
            pipeline,
        }
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.pipeline
    }

    fn source(&self, mode: TransportMode) -> &Arc<dyn BlockSource> {
        match mode {
            TransportMode::Subscription => &self.subscription,
            TransportMode::Polling => &self.polling,
        }
    }

    /// Try every endpoint once, subscription endpoints first.
    ///
    /// Returns `Ok(())` when `cancel` fires and [`TipError::PoolExhausted`]
    /// once both lists are used up.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<(), TipError> {
        self.pool.begin_cycle();
        for mode in [TransportMode::Subscription, TransportMode::Polling] {
            while let Some(endpoint) = self.pool.next(mode) {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                match self.follow(&endpoint, cancel).await {
                    SessionEnd::Cancelled => return Ok(()),
                    SessionEnd::Terminated => self.pool.record_failure(&endpoint),
                }
            }
            if mode == TransportMode::Subscription && self.pool.len(mode) > 0 {
                warn!("subscription endpoints exhausted, falling back to polling");
            }
        }
        Err(TipError::PoolExhausted)
    }

    async fn follow(&self, endpoint: &EndpointHandle, cancel: &CancellationToken) -> SessionEnd {
        let source = self.source(endpoint.mode);
        let opened = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            opened = source.open(endpoint) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!(endpoint = %endpoint.url, mode = %endpoint.mode, error = %e, "failed to open block source");
                return SessionEnd::Terminated;
            }
        };
        self.pool.record_success(endpoint);
        info!(endpoint = %endpoint.url, mode = %endpoint.mode, "following chain tip");

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(endpoint = %endpoint.url, "block source cancelled");
                    return SessionEnd::Cancelled;
                }
                item = stream.next() => item,
            };
            match item {
                Some(Ok(block)) => {
                    self.pipeline.ingest(block).await;
                }
                Some(Err(e)) => {
                    warn!(endpoint = %endpoint.url, mode = %endpoint.mode, error = %e, "block source failed");
                    return SessionEnd::Terminated;
                }
                None => {
                    warn!(endpoint = %endpoint.url, mode = %endpoint.mode, "block source ended");
                    return SessionEnd::Terminated;
                }
            }
        }
    }
}
