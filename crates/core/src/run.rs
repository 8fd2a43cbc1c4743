use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::SlotKey;

/// What a monitored process said about one of its runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Unknown,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "failure" => Ok(Outcome::Failure),
            "unknown" => Ok(Outcome::Unknown),
            other => Err(format!("unknown run outcome: {other}")),
        }
    }
}

/// An observed signal for a slot. Written once; a later report for the same
/// slot replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub slot: SlotKey,
    pub observed_at: DateTime<Utc>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Raw inbound report as submitted by (or on behalf of) a monitored process.
///
/// The timestamp stays a string until ingestion so a malformed value can be
/// rejected with a validation error instead of a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub target: String,
    pub outcome: Outcome,
    pub timestamp: String,
    #[serde(default)]
    pub message: Option<String>,
}
