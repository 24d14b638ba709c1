//! Ethereum JSON-RPC calls used by the block sources.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chaintip_core::{ChainClient, RawBlock, TipError};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::transport::RpcTransport;

/// [`ChainClient`] over any [`RpcTransport`].
pub struct EthClient<T> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: RpcTransport> EthClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<R, TipError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.transport
            .call(id, method, params)
            .await
            .map_err(|e: TransportError| e.into_tip_error(self.transport.url()))
    }

    async fn block(&self, method: &str, selector: Value) -> Result<Option<RawBlock>, TipError> {
        let value: Option<Value> = self.call(method, vec![selector, Value::Bool(false)]).await?;
        value
            .map(|v| block_from_json(&v))
            .transpose()
            .map_err(|reason| TipError::protocol(self.transport.url(), reason))
    }
}

#[async_trait]
impl<T: RpcTransport> ChainClient for EthClient<T> {
    fn endpoint(&self) -> &str {
        self.transport.url()
    }

    async fn block_number(&self) -> Result<u64, TipError> {
        let hex: String = self.call("eth_blockNumber", vec![]).await?;
        parse_quantity(&hex).map_err(|reason| TipError::protocol(self.transport.url(), reason))
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<RawBlock>, TipError> {
        self.block("eth_getBlockByNumber", json!(format!("{number:#x}")))
            .await
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<RawBlock>, TipError> {
        self.block("eth_getBlockByHash", json!(hash)).await
    }

    async fn new_block_filter(&self) -> Result<String, TipError> {
        self.call("eth_newBlockFilter", vec![]).await
    }

    async fn filter_changes(&self, filter_id: &str) -> Result<Vec<String>, TipError> {
        self.call("eth_getFilterChanges", vec![json!(filter_id)]).await
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(hex: &str) -> Result<u64, String> {
    let digits = hex
        .strip_prefix("0x")
        .ok_or_else(|| format!("quantity {hex:?} lacks 0x prefix"))?;
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {hex:?}: {e}"))
}

/// Extract the fields the follower keeps from an `eth_getBlockBy*` result
/// (requested without full transaction objects).
pub fn block_from_json(value: &Value) -> Result<RawBlock, String> {
    let field = |name: &str| value.get(name).and_then(Value::as_str);

    let number = field("number")
        .ok_or("block without number")
        .and_then(|n| parse_quantity(n).map_err(|_| "invalid block number"))?;
    let hash = field("hash").ok_or("block without hash")?;

    let mut block = RawBlock::new(number, hash);
    if let Some(ts) = field("timestamp") {
        let secs = parse_quantity(ts)?;
        block = block.with_timestamp(i64::try_from(secs).map_err(|_| format!("timestamp {ts} out of range"))?);
    }
    if let Some(txs) = value.get("transactions").and_then(Value::as_array) {
        let count = u32::try_from(txs.len()).map_err(|_| "transaction count out of range".to_string())?;
        block = block.with_transactions(count);
    }
    Ok(block)
}
