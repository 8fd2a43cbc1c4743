//! Read-only views of engine state: per-target classification, open
//! incidents, counters, and the per-target activity trail.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use runwatch_compliance::{ActivityEntry, ActivityQuery, EngineMetrics, StatusBoard};
use runwatch_core::RunRecord;
use serde::Serialize;

use crate::state::AppState;

use super::{error, ErrorResponse};

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub board: StatusBoard,
    pub metrics: EngineMetrics,
    pub ledger_records: usize,
    pub config: serde_json::Value,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        board: state.engine.status(),
        metrics: state.engine.metrics(),
        ledger_records: state.engine.ledger.len(),
        config: state.config_summary.clone(),
    })
}

#[derive(Serialize)]
pub struct ActivityResponse {
    pub target: String,
    pub entries: Vec<ActivityEntry>,
    /// Recorded runs, newest slot first.
    pub runs: Vec<RunRecord>,
}

pub async fn target_activity(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<ActivityResponse>, (StatusCode, Json<ErrorResponse>)> {
    if state.engine.registry.target(&name).is_none() {
        return Err(error(StatusCode::NOT_FOUND, format!("unknown target: {name}")));
    }

    Ok(Json(ActivityResponse {
        entries: state.engine.activity.query(&name, &params),
        runs: state.engine.ledger.records_for(&name),
        target: name,
    }))
}
