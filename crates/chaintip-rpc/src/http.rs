//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! Transient failures (connection errors, non-2xx statuses, timeouts) are
//! retried with exponential backoff. Errors the node returns in the JSON-RPC
//! envelope are passed through untouched.

use std::time::Duration;

use async_trait::async_trait;
use chaintip_core::backoff::{Backoff, BackoffConfig};

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

/// Configuration for [`HttpRpcClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: BackoffConfig,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: BackoffConfig {
                max_retries: Some(2),
                initial: Duration::from_millis(250),
                max: Duration::from_secs(2),
                multiplier: 2.0,
            },
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP JSON-RPC client for one endpoint.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    retry: Backoff,
    request_timeout: Duration,
}

impl HttpRpcClient {
    /// Create a client for the given JSON-RPC endpoint URL. Does not touch
    /// the network.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            retry: Backoff::new(config.retry),
            request_timeout: config.request_timeout,
        })
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let bytes = resp.bytes().await.map_err(|e| self.request_error(e))?;
        Ok(serde_json::from_slice::<JsonRpcResponse>(&bytes)?)
    }

    fn request_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_transport() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::debug!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            url = %self.url,
                            method = %req.method,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}
