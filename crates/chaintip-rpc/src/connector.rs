//! [`ChainConnector`] implementations over the HTTP and WebSocket clients.

use async_trait::async_trait;
use chaintip_core::{ChainConnector, EndpointHandle, TipError};

use crate::eth::EthClient;
use crate::http::{HttpClientConfig, HttpRpcClient};
use crate::ws::{WsClientConfig, WsRpcClient};

/// Stateless HTTP connections, used for polling endpoints.
///
/// Connecting does not touch the network; the polling source's first height
/// read is the connection test.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    config: HttpClientConfig,
}

impl HttpConnector {
    pub fn new(config: HttpClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChainConnector for HttpConnector {
    type Client = EthClient<HttpRpcClient>;

    async fn connect(&self, endpoint: &EndpointHandle) -> Result<Self::Client, TipError> {
        let transport = HttpRpcClient::new(endpoint.url.clone(), self.config.clone())
            .map_err(|e| e.into_tip_error(&endpoint.url))?;
        Ok(EthClient::new(transport))
    }
}

/// Persistent WebSocket connections, used for subscription endpoints.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    config: WsClientConfig,
}

impl WsConnector {
    pub fn new(config: WsClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChainConnector for WsConnector {
    type Client = EthClient<WsRpcClient>;

    async fn connect(&self, endpoint: &EndpointHandle) -> Result<Self::Client, TipError> {
        let transport = WsRpcClient::connect(endpoint.url.clone(), self.config.clone())
            .await
            .map_err(|e| e.into_tip_error(&endpoint.url))?;
        Ok(EthClient::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaintip_core::{EndpointPool, HealthConfig, TransportMode};

    #[tokio::test]
    async fn ws_connect_failure_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let pool = EndpointPool::new([url.as_str()], Vec::<String>::new(), HealthConfig::default());
        let handle = pool.next(TransportMode::Subscription).unwrap();
        let err = WsConnector::default().connect(&handle).await.err().unwrap();
        assert!(err.is_connection());
    }
}
