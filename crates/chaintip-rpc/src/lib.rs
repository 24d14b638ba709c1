//! chaintip-rpc: JSON-RPC transports for ChainTip block sources.
//!
//! - [`HttpRpcClient`]: `reqwest` client with retry on transient failures
//! - [`WsRpcClient`]: single-connection WebSocket client, no reconnect
//! - [`EthClient`]: the `eth_*` calls the block sources need, as a
//!   [`chaintip_core::ChainClient`]
//! - [`HttpConnector`] / [`WsConnector`]: plug the above into
//!   [`chaintip_core::PollingSource`] and [`chaintip_core::FilterSource`]

pub mod connector;
pub mod error;
pub mod eth;
pub mod http;
pub mod request;
pub mod transport;
pub mod ws;

pub use connector::{HttpConnector, WsConnector};
pub use error::TransportError;
pub use eth::EthClient;
pub use http::{HttpClientConfig, HttpRpcClient};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;
pub use ws::{WsClientConfig, WsRpcClient};
