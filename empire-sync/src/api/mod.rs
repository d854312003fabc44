//! REST API for the offline sync engine

pub mod handlers;
pub mod sse;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let sync_routes = Router::new()
        .route("/status", get(handlers::get_status))
        .route("/items", post(handlers::submit_item))
        .route("/items/:item_id", delete(handlers::cancel_item))
        .route("/connectivity", post(handlers::set_connectivity))
        .route("/drain", post(handlers::drain_now))
        .route("/dead-letters", get(handlers::get_dead_letters));

    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(handlers::health))
        .nest("/api/sync", sync_routes)
        // SSE events
        .route("/events", get(sse::event_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
