use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub monitoring_enabled: bool,
    pub last_tick: Option<DateTime<Utc>>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let board = state.engine.status();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        monitoring_enabled: board.monitoring_enabled,
        last_tick: board.last_tick,
    })
}
