//! chaintip-server: HTTP query surface and live WebSocket block feed.
//!
//! ```text
//! GET /                    {"message": "Welcome to <project>"}
//! GET <prefix>/ping        {"message": "pong"}
//! GET <prefix>/blocks      newest stored blocks, ?limit=1..100 (default 10)
//! GET <prefix>/status      follower counters and endpoint health
//! GET /ws                  upgrade; one JSON text frame per stored block
//! ```

pub mod error;
pub mod routes;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use chaintip_core::{BlockPublisher, BlockStore, EndpointPool, IngestPipeline};

pub use error::ApiError;

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub project_name: String,
    /// Prefix for the query routes, e.g. `/api/v1`.
    pub api_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".into(),
            project_name: "DeFi Backend MVP".into(),
            api_prefix: "/api/v1".into(),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlockStore>,
    pub publisher: BlockPublisher,
    pub pool: Arc<EndpointPool>,
    pub pipeline: IngestPipeline,
    pub project_name: Arc<str>,
    /// Fires on process shutdown; ends open block feeds.
    pub cancel: CancellationToken,
}

impl AppState {
    /// State over the pipeline's own store and publisher.
    pub fn new(
        pipeline: IngestPipeline,
        pool: Arc<EndpointPool>,
        project_name: &str,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store: pipeline.store().clone(),
            publisher: pipeline.publisher().clone(),
            pool,
            pipeline,
            project_name: Arc::from(project_name),
            cancel,
        }
    }
}

/// Build the router. `api_prefix` is normalized to a leading `/` without a
/// trailing one.
pub fn router(state: AppState, api_prefix: &str) -> Router {
    let prefix = format!("/{}", api_prefix.trim_matches('/'));
    let api = Router::new()
        .route("/ping", get(routes::ping))
        .route("/blocks", get(routes::blocks))
        .route("/status", get(routes::status));

    let app = Router::new()
        .route("/", get(routes::root))
        .route("/ws", get(ws::ws_handler));
    let app = if prefix == "/" {
        app.merge(api)
    } else {
        app.nest(&prefix, api)
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve `app` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
