//! Polling-mode block source.
//!
//! Reads the chain height on a timer. When it advanced, every block in
//! `last_seen + 1 ..= current` is fetched and yielded in ascending order.
//! A block that fails to fetch for a non-transport reason is logged and
//! skipped; a transport failure ends the session. A head that jumps further
//! than [`MAX_CATCH_UP`] blocks is treated as a malformed answer.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::TipError;
use crate::pool::{EndpointHandle, TransportMode};
use crate::source::{BlockSource, BlockStream, ChainClient, ChainConnector};
use crate::types::RawBlock;

/// Default interval between height checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);

/// Largest head advance accepted in one tick.
pub const MAX_CATCH_UP: u64 = 10_000;

/// Height-comparing block source for stateless endpoints.
pub struct PollingSource<C> {
    connector: C,
    interval: Duration,
}

impl<C: ChainConnector> PollingSource<C> {
    pub fn new(connector: C, interval: Duration) -> Self {
        Self { connector, interval }
    }
}

struct PollState<K> {
    client: K,
    /// Last height handed to the fetch loop.
    cursor: u64,
    /// Highest head seen so far.
    target: u64,
    interval: Duration,
    first_tick: bool,
}

#[async_trait]
impl<C> BlockSource for PollingSource<C>
where
    C: ChainConnector + 'static,
{
    fn mode(&self) -> TransportMode {
        TransportMode::Polling
    }

    async fn open(&self, endpoint: &EndpointHandle) -> Result<BlockStream, TipError> {
        let client = self.connector.connect(endpoint).await?;
        let head = client.block_number().await?;
        info!(endpoint = %endpoint.url, head, "polling started");

        let state = PollState {
            client,
            cursor: head,
            target: head,
            interval: self.interval,
            first_tick: true,
        };
        Ok(Box::pin(futures::stream::unfold(
            Some(state),
            next_polled::<C::Client>,
        )))
    }
}

async fn next_polled<K: ChainClient>(
    state: Option<PollState<K>>,
) -> Option<(Result<RawBlock, TipError>, Option<PollState<K>>)> {
    let mut st = state?;
    loop {
        while st.cursor < st.target {
            st.cursor += 1;
            let height = st.cursor;
            match st.client.block_by_number(height).await {
                Ok(Some(block)) => return Some((Ok(block), Some(st))),
                Ok(None) => {
                    warn!(endpoint = st.client.endpoint(), height, "block not available, skipping");
                }
                Err(e) if e.is_connection() => return Some((Err(e), None)),
                Err(e) => {
                    warn!(endpoint = st.client.endpoint(), height, error = %e, "failed to fetch block, skipping");
                }
            }
        }

        if st.first_tick {
            st.first_tick = false;
        } else {
            tokio::time::sleep(st.interval).await;
        }

        match st.client.block_number().await {
            Ok(current) if current > st.target => {
                let advance = current - st.target;
                if advance > MAX_CATCH_UP {
                    let reason = format!("head jumped from {} to {current}", st.target);
                    return Some((Err(TipError::protocol(st.client.endpoint(), reason)), None));
                }
                debug!(
                    endpoint = st.client.endpoint(),
                    from = st.target + 1,
                    to = current,
                    "chain advanced"
                );
                st.target = current;
            }
            Ok(_) => {}
            Err(e) => return Some((Err(e), None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{handle, FakeChain, FakeConnector};
    use futures::StreamExt;

    fn source(connector: FakeConnector) -> PollingSource<FakeConnector> {
        PollingSource::new(connector, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn yields_advanced_range_in_order() {
        let connector = FakeConnector::new().with("https://a", FakeChain::heads([5, 8]));
        let mut stream = source(connector)
            .open(&handle("https://a", TransportMode::Polling))
            .await
            .unwrap();

        let mut heights = vec![];
        while let Some(Ok(block)) = stream.next().await {
            heights.push(block.number);
        }
        assert_eq!(heights, vec![6, 7, 8]);
    }

    #[tokio::test]
    async fn skips_failed_heights() {
        let chain = FakeChain::heads([10, 14]).missing([12]).failing([13]);
        let connector = FakeConnector::new().with("https://a", chain);
        let mut stream = source(connector)
            .open(&handle("https://a", TransportMode::Polling))
            .await
            .unwrap();

        let mut heights = vec![];
        let mut terminal = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(block) => heights.push(block.number),
                Err(e) => terminal = Some(e),
            }
        }
        assert_eq!(heights, vec![11, 14]);
        assert!(terminal.unwrap().is_connection());
    }

    #[tokio::test]
    async fn unchanged_height_yields_nothing_until_advance() {
        let connector = FakeConnector::new().with("https://a", FakeChain::heads([3, 3, 3, 4]));
        let mut stream = source(connector)
            .open(&handle("https://a", TransportMode::Polling))
            .await
            .unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().number, 4);
    }

    #[tokio::test]
    async fn implausible_head_jump_ends_session() {
        let connector = FakeConnector::new().with("https://a", FakeChain::heads([5, u64::MAX]));
        let mut stream = source(connector)
            .open(&handle("https://a", TransportMode::Polling))
            .await
            .unwrap();

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, TipError::Protocol { .. }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn catch_up_up_to_limit_is_fetched() {
        let connector =
            FakeConnector::new().with("https://a", FakeChain::heads([0, MAX_CATCH_UP]));
        let stream = source(connector)
            .open(&handle("https://a", TransportMode::Polling))
            .await
            .unwrap();

        let heights: Vec<u64> = stream
            .take_while(|item| std::future::ready(item.is_ok()))
            .map(|item| item.unwrap().number)
            .collect()
            .await;
        assert_eq!(heights.len() as u64, MAX_CATCH_UP);
        assert_eq!(heights.first(), Some(&1));
        assert_eq!(heights.last(), Some(&MAX_CATCH_UP));
    }

    #[tokio::test]
    async fn open_fails_when_unreachable() {
        let connector = FakeConnector::new().with("https://a", FakeChain::unreachable());
        let err = source(connector)
            .open(&handle("https://a", TransportMode::Polling))
            .await
            .err()
            .unwrap();
        assert!(err.is_rotatable());
    }
}
