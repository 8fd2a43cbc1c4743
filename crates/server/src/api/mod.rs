//! HTTP endpoint modules.
//!
//! `runs` owns the inbound report path; `status` serves read-only views of
//! engine state.

mod health;
mod runs;
mod status;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: msg.into() }))
}

// ── Re-exports ───────────────────────────────────────────────────

pub use health::health;
pub use runs::submit_run;
pub use status::{status, target_activity};
