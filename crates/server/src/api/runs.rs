//! Inbound run reports.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use runwatch_compliance::{ActivityKind, ActivityLevel, RecordOutcome};
use runwatch_core::{RunReport, SlotKey};
use serde::Serialize;

use crate::state::AppState;

use super::{error, ErrorResponse};

#[derive(Serialize)]
pub struct RunAccepted {
    pub slot: SlotKey,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

/// `POST /api/v1/runs`: record a run outcome against the slot it completes.
///
/// 201 for a new record, 200 when it repeats or replaces an earlier one,
/// 422 when the report is rejected. The ledger write may touch the
/// persistent store, so it runs on the blocking pool.
pub async fn submit_run(
    State(state): State<Arc<AppState>>,
    Json(report): Json<RunReport>,
) -> Result<(StatusCode, Json<RunAccepted>), (StatusCode, Json<ErrorResponse>)> {
    let now = state.clock.now();
    let engine = &state.engine;

    let ledger = Arc::clone(&engine.ledger);
    let (report, result) = tokio::task::spawn_blocking(move || {
        let result = ledger.ingest(&report, now);
        (report, result)
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "run report ingest task failed");
        error(StatusCode::INTERNAL_SERVER_ERROR, "failed to record run")
    })?;

    match result {
        Ok((slot, outcome)) => {
            engine
                .metrics
                .write()
                .expect("engine metrics lock poisoned")
                .reports_accepted += 1;

            let level = match outcome {
                RecordOutcome::Replaced { .. } => ActivityLevel::Warning,
                _ => ActivityLevel::Info,
            };
            let message = match outcome {
                RecordOutcome::Inserted => format!("{} reported for {slot}", report.outcome),
                RecordOutcome::Unchanged => format!("{} re-reported for {slot}", report.outcome),
                RecordOutcome::Replaced { previous } => {
                    format!("{} replaces {previous} for {slot}", report.outcome)
                }
            };
            engine.activity.log(&report.target, now, level, ActivityKind::Report, message);

            let status = match outcome {
                RecordOutcome::Inserted => StatusCode::CREATED,
                _ => StatusCode::OK,
            };
            Ok((status, Json(RunAccepted { slot, outcome })))
        }
        Err(e) => {
            tracing::warn!(target_name = %report.target, error = %e, "run report rejected");
            engine
                .metrics
                .write()
                .expect("engine metrics lock poisoned")
                .reports_rejected += 1;
            // Activity is only kept for configured targets.
            if engine.registry.target(&report.target).is_some() {
                engine.activity.log(
                    &report.target,
                    now,
                    ActivityLevel::Warning,
                    ActivityKind::ReportRejected,
                    e.to_string(),
                );
            }
            Err(error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
    }
}
