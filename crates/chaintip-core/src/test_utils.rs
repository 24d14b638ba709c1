//! Scripted in-memory chain endpoints for source and follower tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::TipError;
use crate::health::HealthConfig;
use crate::pool::{EndpointHandle, EndpointPool, TransportMode};
use crate::source::{ChainClient, ChainConnector};
use crate::types::RawBlock;

pub(crate) fn fake_block(number: u64) -> RawBlock {
    RawBlock::new(number, format!("0x{number:x}"))
        .with_timestamp(1_700_000_000 + number as i64)
        .with_transactions((number % 7) as u32)
}

/// Handle for a single-endpoint pool, good enough to call `open` directly.
pub(crate) fn handle(url: &str, mode: TransportMode) -> EndpointHandle {
    let pool = match mode {
        TransportMode::Subscription => {
            EndpointPool::new([url], Vec::<String>::new(), HealthConfig::default())
        }
        TransportMode::Polling => {
            EndpointPool::new(Vec::<String>::new(), [url], HealthConfig::default())
        }
    };
    pool.next(mode).expect("one endpoint configured")
}

/// Script for one fake endpoint. Once a script runs out, calls fail with a
/// connection error, which ends the session.
#[derive(Default)]
pub(crate) struct FakeChain {
    unreachable: bool,
    heads: VecDeque<u64>,
    /// Head scripts swapped in on each successive connect.
    sessions: VecDeque<Vec<u64>>,
    filter_batches: VecDeque<Vec<u64>>,
    missing: HashSet<u64>,
    failing: HashSet<u64>,
}

impl FakeChain {
    pub(crate) fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub(crate) fn heads(heads: impl IntoIterator<Item = u64>) -> Self {
        Self {
            heads: heads.into_iter().collect(),
            ..Default::default()
        }
    }

    /// One head script per connection; connects past the last one get an
    /// empty script.
    pub(crate) fn sessions(sessions: impl IntoIterator<Item = Vec<u64>>) -> Self {
        Self {
            sessions: sessions.into_iter().collect(),
            ..Default::default()
        }
    }

    pub(crate) fn filter_batches(batches: impl IntoIterator<Item = Vec<u64>>) -> Self {
        Self {
            filter_batches: batches.into_iter().collect(),
            ..Default::default()
        }
    }

    pub(crate) fn missing(mut self, heights: impl IntoIterator<Item = u64>) -> Self {
        self.missing.extend(heights);
        self
    }

    pub(crate) fn failing(mut self, heights: impl IntoIterator<Item = u64>) -> Self {
        self.failing.extend(heights);
        self
    }
}

pub(crate) struct FakeClient {
    url: String,
    chain: Arc<Mutex<FakeChain>>,
}

impl FakeClient {
    fn block(&self, number: u64) -> Result<Option<RawBlock>, TipError> {
        let chain = self.chain.lock().unwrap();
        if chain.failing.contains(&number) {
            return Err(TipError::protocol(&self.url, format!("block {number} malformed")));
        }
        if chain.missing.contains(&number) {
            return Ok(None);
        }
        Ok(Some(fake_block(number)))
    }
}

#[async_trait]
impl ChainClient for FakeClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn block_number(&self) -> Result<u64, TipError> {
        self.chain
            .lock()
            .unwrap()
            .heads
            .pop_front()
            .ok_or_else(|| TipError::connection(&self.url, "script exhausted"))
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<RawBlock>, TipError> {
        self.block(number)
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<RawBlock>, TipError> {
        let digits = hash.trim_start_matches("0x");
        let number = u64::from_str_radix(digits, 16)
            .map_err(|e| TipError::protocol(&self.url, e))?;
        self.block(number)
    }

    async fn new_block_filter(&self) -> Result<String, TipError> {
        Ok("0xf1".into())
    }

    async fn filter_changes(&self, _filter_id: &str) -> Result<Vec<String>, TipError> {
        let batch = self
            .chain
            .lock()
            .unwrap()
            .filter_batches
            .pop_front()
            .ok_or_else(|| TipError::connection(&self.url, "script exhausted"))?;
        Ok(batch.into_iter().map(|n| format!("0x{n:x}")).collect())
    }
}

/// Connector over a set of scripted endpoints; records every connect attempt.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    chains: Arc<Mutex<HashMap<String, Arc<Mutex<FakeChain>>>>>,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, url: &str, chain: FakeChain) -> Self {
        self.chains
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::new(Mutex::new(chain)));
        self
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainConnector for FakeConnector {
    type Client = FakeClient;

    async fn connect(&self, endpoint: &EndpointHandle) -> Result<FakeClient, TipError> {
        self.attempts.lock().unwrap().push(endpoint.url.clone());
        let chain = self
            .chains
            .lock()
            .unwrap()
            .get(&endpoint.url)
            .cloned()
            .ok_or_else(|| TipError::connection(&endpoint.url, "unknown host"))?;
        {
            let mut script = chain.lock().unwrap();
            if script.unreachable {
                return Err(TipError::connection(&endpoint.url, "connection refused"));
            }
            if let Some(heads) = script.sessions.pop_front() {
                script.heads = heads.into();
            }
        }
        Ok(FakeClient {
            url: endpoint.url.clone(),
            chain,
        })
    }
}
