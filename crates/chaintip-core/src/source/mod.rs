//! Block sources: "give me new blocks as they appear".
//!
//! Two strategies share the [`BlockSource`] interface:
//!
//! ```text
//! FilterSource  (subscription mode)  connect → eth_newBlockFilter → tick: changes → fetch by hash
//! PollingSource (polling mode)       connect → head → tick: head advanced? → fetch range by number
//! ```
//!
//! Upstream access goes through [`ChainConnector`] / [`ChainClient`], so the
//! strategies run unchanged against JSON-RPC endpoints or in-memory fakes.

pub mod filter;
pub mod polling;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::TipError;
use crate::pool::{EndpointHandle, TransportMode};
use crate::types::RawBlock;

pub use filter::FilterSource;
pub use polling::PollingSource;

/// A lazy sequence of blocks from one upstream session.
///
/// An `Err` item ends the session; dropping the stream releases the upstream
/// connection.
pub type BlockStream = Pin<Box<dyn Stream<Item = Result<RawBlock, TipError>> + Send>>;

/// Produces a [`BlockStream`] from an endpoint.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// The endpoint list this source draws from.
    fn mode(&self) -> TransportMode;

    /// Connect to `endpoint` and start following the chain tip.
    ///
    /// Fails with [`TipError::Connection`] or [`TipError::Protocol`].
    async fn open(&self, endpoint: &EndpointHandle) -> Result<BlockStream, TipError>;
}

/// Chain queries a block source needs from one upstream endpoint.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Endpoint identifier, for logs.
    fn endpoint(&self) -> &str;

    /// Current chain height.
    async fn block_number(&self) -> Result<u64, TipError>;

    /// Block by height; `Ok(None)` if the node does not have it.
    async fn block_by_number(&self, number: u64) -> Result<Option<RawBlock>, TipError>;

    /// Block by hash; `Ok(None)` if the node does not have it.
    async fn block_by_hash(&self, hash: &str) -> Result<Option<RawBlock>, TipError>;

    /// Install a new-block filter and return its id.
    async fn new_block_filter(&self) -> Result<String, TipError>;

    /// Block hashes seen by `filter_id` since the previous call.
    async fn filter_changes(&self, filter_id: &str) -> Result<Vec<String>, TipError>;
}

/// Opens a [`ChainClient`] for an endpoint.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    type Client: ChainClient + 'static;

    async fn connect(&self, endpoint: &EndpointHandle) -> Result<Self::Client, TipError>;
}
