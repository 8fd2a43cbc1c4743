//! Notifier and status-reporter traits plus shared error types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use runwatch_core::{Alert, ComplianceState, SlotKey};

/// Errors from a single delivery attempt on one channel.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A channel that still failed after its retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("channel '{channel}' failed after {attempts} attempt(s): {reason}")]
pub struct DispatchError {
    pub channel: String,
    pub attempts: u32,
    pub reason: String,
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    /// Target, kind, event and severity of the originating alert.
    pub metadata: HashMap<String, String>,
}

impl Notification {
    /// Metadata carried alongside every rendered alert.
    pub fn alert_metadata(alert: &Alert) -> HashMap<String, String> {
        HashMap::from([
            ("target".to_string(), alert.target.clone()),
            ("kind".to_string(), alert.kind.to_string()),
            ("event".to_string(), alert.event.to_string()),
            ("severity".to_string(), alert.severity.to_string()),
            ("slot".to_string(), alert.slot.to_string()),
        ])
    }

    pub fn target(&self) -> Option<&str> {
        self.metadata.get("target").map(String::as_str)
    }
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Test connectivity with a sample notification.
    async fn test(&self) -> Result<(), NotifyError> {
        let test_notification = Notification {
            subject: "[TEST] Schedule monitor test".to_string(),
            body: "This is a test notification from the runwatch schedule monitor.".to_string(),
            metadata: HashMap::from([("event".to_string(), "test".to_string())]),
        };
        self.send(&test_notification).await
    }

    /// Human-readable name for this channel (e.g., "email", "status_api").
    fn channel_name(&self) -> &str;
}

/// Per-target compliance update pushed to the status backend.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TargetStatus {
    pub target: String,
    pub state: ComplianceState,
    pub slot: SlotKey,
    pub evaluated_at: DateTime<Utc>,
}

/// Receives compliance state for every evaluated target and a liveness
/// heartbeat from the monitor itself.
#[async_trait::async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report_status(&self, status: &TargetStatus) -> Result<(), NotifyError>;

    async fn heartbeat(&self, at: DateTime<Utc>) -> Result<(), NotifyError>;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub target: String,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<DispatchError>,
}

impl DispatchResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}
