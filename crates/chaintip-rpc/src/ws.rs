//! WebSocket JSON-RPC client.
//!
//! The socket is opened in [`WsRpcClient::connect`], so an unreachable
//! endpoint fails there. A background task owns the socket and matches
//! responses to requests by id. The client does not reconnect: once the
//! socket drops, pending and later requests fail with a WebSocket error and
//! the owner is expected to move on to another endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<JsonRpcResponse, TransportError>>;

#[derive(Clone, Default)]
struct PendingMap(Arc<Mutex<HashMap<u64, Reply>>>);

impl PendingMap {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Reply>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fail_all(&self, reason: &str) {
        for (_, tx) in self.lock().drain() {
            let _ = tx.send(Err(TransportError::WebSocket(reason.to_string())));
        }
    }
}

/// Configuration for the WebSocket client.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Upper bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Upper bound on waiting for a single response.
    pub request_timeout: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Command sent from callers to the background WS task.
enum WsCommand {
    Send { req: JsonRpcRequest, tx: Reply },
    Close,
}

/// WebSocket JSON-RPC client for one endpoint.
pub struct WsRpcClient {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    request_timeout: Duration,
}

impl WsRpcClient {
    /// Open the socket and start the background task.
    pub async fn connect(
        url: impl Into<String>,
        config: WsClientConfig,
    ) -> Result<Self, TransportError> {
        let url = url.into();
        let (ws_stream, _) =
            tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(&url))
                .await
                .map_err(|_| TransportError::Timeout {
                    ms: config.connect_timeout.as_millis() as u64,
                })?
                .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        tracing::debug!(url = %url, "WebSocket connected");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WsCommand>();
        tokio::spawn(ws_task(url.clone(), ws_stream, cmd_rx));

        Ok(Self {
            url,
            cmd_tx,
            request_timeout: config.request_timeout,
        })
    }
}

impl Drop for WsRpcClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

#[async_trait]
impl RpcTransport for WsRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Send { req, tx })
            .map_err(|_| TransportError::WebSocket("connection closed".into()))?;
        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(reply) => reply.map_err(|_| TransportError::WebSocket("connection closed".into()))?,
            Err(_) => Err(TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Background task that owns the WebSocket connection.
async fn ws_task(url: String, ws_stream: WsStream, mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>) {
    let pending = PendingMap::default();
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(WsCommand::Close) => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    Some(WsCommand::Send { req, tx }) => {
                        let Some(id) = req.id.as_number() else {
                            let _ = tx.send(Err(TransportError::WebSocket("non-numeric request id".into())));
                            continue;
                        };
                        let msg = match serde_json::to_string(&req) {
                            Ok(msg) => msg,
                            Err(e) => {
                                let _ = tx.send(Err(e.into()));
                                continue;
                            }
                        };
                        pending.lock().insert(id, tx);
                        if let Err(e) = sink.send(Message::Text(msg.into())).await {
                            tracing::warn!(url = %url, error = %e, "WS send failed");
                            break;
                        }
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break,
                    Some(Err(e)) => {
                        tracing::warn!(url = %url, error = %e, "WS receive error");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => handle_message(&text, &pending),
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!(url = %url, "WebSocket closed");
    pending.fail_all("connection closed");
}

fn handle_message(text: &str, pending: &PendingMap) {
    let resp = match serde_json::from_str::<JsonRpcResponse>(text) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unrecognised WS message");
            return;
        }
    };
    let Some(id) = resp.id.as_number() else {
        return;
    };
    if let Some(tx) = pending.lock().remove(&id) {
        let _ = tx.send(Ok(resp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
    use axum::routing::get;
    use axum::Router;
    use serde_json::{json, Value};

    async fn serve<F, Fut>(handler: F) -> String
    where
        F: Fn(WebSocket) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = Router::new().route(
            "/",
            get(move |ws: WebSocketUpgrade| {
                let handler = handler.clone();
                async move { ws.on_upgrade(handler) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("ws://{addr}")
    }

    /// Answers every request with its method name as the result.
    async fn echo_method(mut socket: WebSocket) {
        while let Some(Ok(AxumMessage::Text(text))) = socket.recv().await {
            let req: Value = serde_json::from_str(&text).unwrap();
            let resp = json!({"jsonrpc": "2.0", "id": req["id"], "result": req["method"]});
            if socket.send(AxumMessage::Text(resp.to_string())).await.is_err() {
                return;
            }
        }
    }

    /// Reads one request, then hangs up without answering.
    async fn hang_up(mut socket: WebSocket) {
        let _ = socket.recv().await;
        let _ = socket.send(AxumMessage::Close(None)).await;
    }

    #[tokio::test]
    async fn matches_responses_by_id() {
        let url = serve(echo_method).await;
        let client = WsRpcClient::connect(url, WsClientConfig::default()).await.unwrap();

        let (a, b) = tokio::join!(
            client.call::<String>(1, "eth_blockNumber", vec![]),
            client.call::<String>(2, "eth_newBlockFilter", vec![]),
        );
        assert_eq!(a.unwrap(), "eth_blockNumber");
        assert_eq!(b.unwrap(), "eth_newBlockFilter");
    }

    #[tokio::test]
    async fn disconnect_fails_pending_and_later_requests() {
        let url = serve(hang_up).await;
        let client = WsRpcClient::connect(url, WsClientConfig::default()).await.unwrap();

        let err = client.call::<Value>(1, "eth_blockNumber", vec![]).await.unwrap_err();
        assert!(err.is_transport());
        let err = client.call::<Value>(2, "eth_blockNumber", vec![]).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn connect_fails_when_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsRpcClient::connect(format!("ws://{addr}"), WsClientConfig::default()).await;
        assert!(matches!(result, Err(TransportError::WebSocket(_))));
    }
}
