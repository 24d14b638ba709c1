//! Subscription-mode block source.
//!
//! Holds a persistent connection with an installed new-block filter. Each
//! tick asks the endpoint for the block hashes matched since the last tick
//! and fetches the full block for each. Any error ends the session.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::TipError;
use crate::pool::{EndpointHandle, TransportMode};
use crate::source::{BlockSource, BlockStream, ChainClient, ChainConnector};
use crate::types::RawBlock;

/// Default interval between filter polls.
pub const DEFAULT_FILTER_INTERVAL: Duration = Duration::from_secs(1);

/// New-heads filter block source for persistent connections.
pub struct FilterSource<C> {
    connector: C,
    tick: Duration,
}

impl<C: ChainConnector> FilterSource<C> {
    pub fn new(connector: C, tick: Duration) -> Self {
        Self { connector, tick }
    }
}

struct FilterState<K> {
    client: K,
    filter_id: String,
    pending: VecDeque<String>,
    tick: Duration,
    first_tick: bool,
}

#[async_trait]
impl<C> BlockSource for FilterSource<C>
where
    C: ChainConnector + 'static,
{
    fn mode(&self) -> TransportMode {
        TransportMode::Subscription
    }

    async fn open(&self, endpoint: &EndpointHandle) -> Result<BlockStream, TipError> {
        let client = self.connector.connect(endpoint).await?;
        let filter_id = client.new_block_filter().await?;
        info!(endpoint = %endpoint.url, filter_id = %filter_id, "block filter installed");

        let state = FilterState {
            client,
            filter_id,
            pending: VecDeque::new(),
            tick: self.tick,
            first_tick: true,
        };
        Ok(Box::pin(futures::stream::unfold(
            Some(state),
            next_filtered::<C::Client>,
        )))
    }
}

async fn next_filtered<K: ChainClient>(
    state: Option<FilterState<K>>,
) -> Option<(Result<RawBlock, TipError>, Option<FilterState<K>>)> {
    let mut st = state?;
    loop {
        while let Some(hash) = st.pending.pop_front() {
            match st.client.block_by_hash(&hash).await {
                Ok(Some(block)) => return Some((Ok(block), Some(st))),
                Ok(None) => {
                    warn!(endpoint = st.client.endpoint(), hash = %hash, "announced block not found, skipping");
                }
                Err(e) => return Some((Err(e), None)),
            }
        }

        if st.first_tick {
            st.first_tick = false;
        } else {
            tokio::time::sleep(st.tick).await;
        }

        match st.client.filter_changes(&st.filter_id).await {
            Ok(hashes) => {
                if !hashes.is_empty() {
                    debug!(endpoint = st.client.endpoint(), count = hashes.len(), "new blocks announced");
                }
                st.pending.extend(hashes);
            }
            Err(e) => return Some((Err(e), None)),
        }
    }
}
