//! Fan-out publisher for newly stored blocks.
//!
//! Backed by a Tokio broadcast channel: `publish` never waits on subscribers.
//! A subscriber that falls more than `capacity` messages behind skips the
//! oldest ones; late subscribers only see blocks published after they joined.

use futures::Stream;
use tokio::sync::broadcast;

use crate::types::BlockRecord;

/// Default per-subscriber buffer size.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Broadcasts each stored block to every current subscriber.
#[derive(Debug, Clone)]
pub struct BlockPublisher {
    tx: broadcast::Sender<BlockRecord>,
}

impl BlockPublisher {
    /// Create a publisher whose subscribers buffer up to `capacity` records.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Deliver `record` to all subscribers. Returns how many were reached.
    pub fn publish(&self, record: BlockRecord) -> usize {
        let height = record.height;
        match self.tx.send(record) {
            Ok(n) => n,
            Err(_) => {
                tracing::trace!(height, "no active subscribers");
                0
            }
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> BlockSubscription {
        BlockSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BlockPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// One subscriber's view of the publisher. Dropping it deregisters.
#[derive(Debug)]
pub struct BlockSubscription {
    rx: broadcast::Receiver<BlockRecord>,
}

impl BlockSubscription {
    /// Next published record, or `None` once the publisher is gone.
    ///
    /// Records this subscriber fell too far behind on are skipped.
    pub async fn recv(&mut self) -> Option<BlockRecord> {
        loop {
            match self.rx.recv().await {
                Ok(record) => return Some(record),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "subscriber lagged, skipping blocks");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` if nothing is queued.
    pub fn try_recv(&mut self) -> Option<BlockRecord> {
        loop {
            match self.rx.try_recv() {
                Ok(record) => return Some(record),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "subscriber lagged, skipping blocks");
                }
                Err(_) => return None,
            }
        }
    }

    /// Adapt into an infinite `Stream`; ends only when the publisher is dropped.
    pub fn into_stream(self) -> impl Stream<Item = BlockRecord> + Send + Unpin {
        Box::pin(futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|record| (record, sub))
        }))
    }
}
