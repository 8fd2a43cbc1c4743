use std::sync::Arc;

use runwatch_compliance::{Clock, EngineHandle};

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub engine: EngineHandle,
    pub clock: Arc<dyn Clock>,
    /// Redacted config view served on the status endpoint.
    pub config_summary: serde_json::Value,
}
