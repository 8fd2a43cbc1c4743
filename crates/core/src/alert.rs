use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::SlotKey;

/// Classification of a slot at one evaluation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceState {
    /// Succeeded within `[expected, expected + grace]`.
    OnTime,
    /// Nothing conclusive yet, grace period still running.
    Late,
    /// Grace period elapsed without a success.
    Missed,
    /// The process reported a failure for the slot.
    Failed,
    /// A success arrived for a slot that was already non-compliant.
    Recovered,
}

impl ComplianceState {
    /// The incident this state opens, if any.
    pub fn incident(&self) -> Option<IncidentKind> {
        match self {
            ComplianceState::Missed => Some(IncidentKind::Missed),
            ComplianceState::Failed => Some(IncidentKind::Failed),
            _ => None,
        }
    }

    /// Whether this state closes open incidents.
    pub fn is_resolved(&self) -> bool {
        matches!(self, ComplianceState::OnTime | ComplianceState::Recovered)
    }

    pub fn is_healthy(&self) -> bool {
        !matches!(self, ComplianceState::Missed | ComplianceState::Failed)
    }
}

impl std::fmt::Display for ComplianceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ComplianceState::OnTime => "on_time",
            ComplianceState::Late => "late",
            ComplianceState::Missed => "missed",
            ComplianceState::Failed => "failed",
            ComplianceState::Recovered => "recovered",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Missed,
    Failed,
}

impl std::fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentKind::Missed => write!(f, "missed"),
            IncidentKind::Failed => write!(f, "failed"),
        }
    }
}

/// Alert severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Whether an alert opens (or repeats) an incident or announces its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEvent {
    Trigger,
    Resolve,
}

impl std::fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertEvent::Trigger => write!(f, "trigger"),
            AlertEvent::Resolve => write!(f, "resolve"),
        }
    }
}

/// A notification the deduplicator decided should go out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub target: String,
    pub kind: IncidentKind,
    pub event: AlertEvent,
    pub severity: Severity,
    pub message: String,
    pub slot: SlotKey,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Short title, e.g. "Worker run missed" or "Publisher run recovered".
    pub fn title(&self) -> String {
        match self.event {
            AlertEvent::Trigger => format!("{} run {}", self.target, self.kind),
            AlertEvent::Resolve => format!("{} run recovered", self.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missed_and_failed_open_incidents() {
        assert_eq!(ComplianceState::Missed.incident(), Some(IncidentKind::Missed));
        assert_eq!(ComplianceState::Failed.incident(), Some(IncidentKind::Failed));
        assert_eq!(ComplianceState::Late.incident(), None);
        assert_eq!(ComplianceState::OnTime.incident(), None);
        assert_eq!(ComplianceState::Recovered.incident(), None);
    }

    #[test]
    fn late_neither_opens_nor_resolves() {
        assert!(!ComplianceState::Late.is_resolved());
        assert!(ComplianceState::Late.is_healthy());
        assert!(ComplianceState::Recovered.is_resolved());
    }

    #[test]
    fn severity_orders_by_urgency() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&ComplianceState::OnTime).unwrap();
        assert_eq!(json, "\"on_time\"");
    }
}
