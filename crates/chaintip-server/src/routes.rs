//! Query routes.

use axum::extract::{Query, State};
use axum::Json;
use chaintip_core::{BlockRecord, EndpointStats, IngestStats};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::AppState;

/// Default and maximum page size for `/blocks`.
pub const DEFAULT_BLOCKS_LIMIT: usize = 10;
pub const MAX_BLOCKS_LIMIT: usize = 100;

pub(crate) async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "message": format!("Welcome to {}", state.project_name) }))
}

pub(crate) async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlocksQuery {
    limit: Option<usize>,
}

pub(crate) async fn blocks(
    State(state): State<AppState>,
    Query(query): Query<BlocksQuery>,
) -> Result<Json<Vec<BlockRecord>>, ApiError> {
    let limit = match query.limit {
        None => DEFAULT_BLOCKS_LIMIT,
        Some(0) => return Err(ApiError::BadRequest("limit must be at least 1".into())),
        Some(n) => n.min(MAX_BLOCKS_LIMIT),
    };
    Ok(Json(state.store.list_recent(limit).await?))
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    latest_height: Option<u64>,
    subscribers: usize,
    ingest: IngestStats,
    endpoints: Vec<EndpointStats>,
}

pub(crate) async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(StatusResponse {
        latest_height: state.store.latest_height().await?,
        subscribers: state.publisher.subscriber_count(),
        ingest: state.pipeline.stats(),
        endpoints: state.pool.stats(),
    }))
}
