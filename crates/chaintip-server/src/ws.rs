//! `/ws` block feed: every newly stored block, one JSON text frame each.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chaintip_core::BlockSubscription;
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::AppState;

pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let subscription = state.publisher.subscribe();
    let cancel = state.cancel.clone();
    ws.on_upgrade(move |socket| feed(socket, subscription, cancel))
}

/// Forward published blocks until the client goes away or the server stops.
async fn feed(socket: WebSocket, mut subscription: BlockSubscription, cancel: CancellationToken) {
    let (mut sender, mut receiver) = socket.split();
    debug!("block feed subscriber connected");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            record = subscription.recv() => {
                let Some(record) = record else { break };
                let text = match serde_json::to_string(&record) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(height = record.height, error = %e, "failed to encode block");
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    // inbound frames carry no meaning on this feed
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!("block feed subscriber disconnected");
}
