//! In-memory per-target activity log.
//!
//! Records reports, classifications, alert decisions and delivery failures,
//! capped per target (default 500) with FIFO eviction. Uses
//! `std::sync::RwLock` so the HTTP handlers and the evaluation loop can both
//! reach it without an async lock.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl ActivityLevel {
    /// Numeric severity for comparison (higher = more severe).
    pub fn as_severity(&self) -> u8 {
        match self {
            ActivityLevel::Debug => 0,
            ActivityLevel::Info => 1,
            ActivityLevel::Warning => 2,
            ActivityLevel::Error => 3,
        }
    }
}

/// What produced an activity entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Report,
    ReportRejected,
    Evaluation,
    EvaluationError,
    Alert,
    Suppressed,
    Resolve,
    DispatchError,
    StatusReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub level: ActivityLevel,
    pub kind: ActivityKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Filters for [`ActivityLog::query`].
#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    /// Minimum level (inclusive).
    pub level: Option<ActivityLevel>,
    pub kind: Option<ActivityKind>,
    /// Maximum number of entries to return (default 100).
    pub limit: Option<u32>,
    /// Only entries at or after this RFC 3339 timestamp.
    pub since: Option<String>,
}

pub struct ActivityLog {
    entries: RwLock<HashMap<String, VecDeque<ActivityEntry>>>,
    max_entries_per_target: usize,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::with_max_entries(500)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries_per_target: max,
        }
    }

    /// Append an entry without structured details.
    pub fn log(
        &self,
        target: &str,
        at: DateTime<Utc>,
        level: ActivityLevel,
        kind: ActivityKind,
        message: impl Into<String>,
    ) {
        self.log_with_details(target, at, level, kind, message, None);
    }

    pub fn log_with_details(
        &self,
        target: &str,
        at: DateTime<Utc>,
        level: ActivityLevel,
        kind: ActivityKind,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) {
        let entry = ActivityEntry {
            timestamp: at,
            target: target.to_string(),
            level,
            kind,
            message: message.into(),
            details,
        };

        let mut guard = self.entries.write().expect("activity log lock poisoned");
        let deque = guard.entry(target.to_string()).or_default();
        deque.push_back(entry);
        while deque.len() > self.max_entries_per_target {
            deque.pop_front();
        }
    }

    /// Entries for `target`, newest first.
    pub fn query(&self, target: &str, params: &ActivityQuery) -> Vec<ActivityEntry> {
        let guard = self.entries.read().expect("activity log lock poisoned");
        let Some(deque) = guard.get(target) else {
            return Vec::new();
        };

        let min_severity = params.level.map(|l| l.as_severity()).unwrap_or(0);
        let since: Option<DateTime<Utc>> = params
            .since
            .as_ref()
            .and_then(|s| s.parse::<DateTime<Utc>>().ok());
        let limit = params.limit.unwrap_or(100) as usize;

        deque
            .iter()
            .rev()
            .filter(|e| e.level.as_severity() >= min_severity)
            .filter(|e| params.kind.map_or(true, |k| e.kind == k))
            .filter(|e| since.map_or(true, |s| e.timestamp >= s))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self, target: &str) -> usize {
        self.entries
            .read()
            .expect("activity log lock poisoned")
            .get(target)
            .map_or(0, VecDeque::len)
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}
