//! HTTP router construction.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api;
use crate::state::AppState;

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/v1/runs", post(api::submit_run))
        .route("/api/v1/status", get(api::status))
        .route("/api/v1/targets/{name}/activity", get(api::target_activity))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
