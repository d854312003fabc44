//! HTTP request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use empire_common::deferred::{DeadLetter, DrainReport, QueueStatus, Submitted};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
    ready: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    status: String,
    id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    status: String,
    id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    online: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectivityResponse {
    ready: bool,
    /// Present when the request caused a drain
    drain: Option<DrainReport>,
}

// ============================================================================
// Endpoints
// ============================================================================

/// GET /health
///
/// Lazily initializes the service if startup initialization failed.
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.service.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        module: "empire-sync".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: state.port,
        ready: state.service.is_ready(),
    }))
}

/// GET /api/sync/status
pub async fn get_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.service.status())
}

/// POST /api/sync/items - dispatch now or queue
pub async fn submit_item(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    if payload.is_null() {
        return Err(ApiError::BadRequest("payload must not be null".to_string()));
    }

    let response = match state.service.submit(payload).await? {
        Submitted::Dispatched(id) => (
            StatusCode::OK,
            Json(SubmitResponse {
                status: "dispatched".to_string(),
                id,
            }),
        ),
        Submitted::Queued(id) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                status: "queued".to_string(),
                id,
            }),
        ),
    };
    Ok(response)
}

/// DELETE /api/sync/items/:item_id - cancel a queued item
pub async fn cancel_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    state.service.cancel(item_id)?;
    Ok(Json(CancelResponse {
        status: "cancelled".to_string(),
        id: item_id,
    }))
}

/// POST /api/sync/connectivity - external online/offline signal
pub async fn set_connectivity(
    State(state): State<AppState>,
    Json(request): Json<ConnectivityRequest>,
) -> Json<ConnectivityResponse> {
    info!("Connectivity signal: online={}", request.online);
    let drain = state.service.set_ready(request.online).await;
    Json(ConnectivityResponse {
        ready: state.service.is_ready(),
        drain,
    })
}

/// POST /api/sync/drain - run a drain episode now
pub async fn drain_now(State(state): State<AppState>) -> Json<DrainReport> {
    Json(state.service.drain().await)
}

/// GET /api/sync/dead-letters
pub async fn get_dead_letters(State(state): State<AppState>) -> Json<Vec<DeadLetter<Value>>> {
    Json(state.service.dead_letters())
}
