//! Rolling health per target, derived from the run ledger.
//!
//! Complements the per-slot classification with a longer view: how many
//! recent runs succeeded and how long ago the last success was.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use runwatch_core::config::HealthConfig;
use runwatch_core::duration::format_duration;
use runwatch_core::{ComplianceState, Outcome, RunRecord};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    /// No runs reported inside the window.
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetHealth {
    pub status: HealthStatus,
    pub recent_runs: usize,
    pub recent_successes: usize,
    /// Percent of recent runs that succeeded. `None` without recent runs.
    pub success_rate: Option<f64>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub issues: Vec<String>,
}

/// Thresholds for [`TargetHealth`].
#[derive(Debug, Clone)]
pub struct HealthPolicy {
    pub window: Duration,
    pub min_success_rate: f64,
    pub stale_after: Duration,
}

impl HealthPolicy {
    pub fn from_config(config: &HealthConfig) -> Self {
        Self {
            window: config.window,
            min_success_rate: config.min_success_rate,
            stale_after: config.stale_after,
        }
    }

    /// Roll up `records` for one target as of `now`.
    ///
    /// `current` is the target's latest classification; an open incident
    /// degrades an otherwise healthy target.
    pub fn assess(
        &self,
        records: &[RunRecord],
        current: Option<ComplianceState>,
        now: DateTime<Utc>,
    ) -> TargetHealth {
        let since = TimeDelta::from_std(self.window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w));
        let recent: Vec<&RunRecord> = records
            .iter()
            .filter(|r| r.observed_at <= now && since.map_or(true, |s| r.observed_at > s))
            .collect();
        let recent_successes = recent.iter().filter(|r| r.outcome == Outcome::Success).count();

        let last_run = records.iter().map(|r| r.observed_at).max();
        let last_success = records
            .iter()
            .filter(|r| r.outcome == Outcome::Success)
            .map(|r| r.observed_at)
            .max();

        let mut status = HealthStatus::Healthy;
        let mut issues = Vec::new();

        let success_rate = if recent.is_empty() {
            status = HealthStatus::Inactive;
            issues.push(format!("No runs reported in the last {}", format_duration(self.window)));
            None
        } else {
            let rate = recent_successes as f64 / recent.len() as f64 * 100.0;
            if rate < self.min_success_rate {
                status = HealthStatus::Degraded;
                issues.push(format!("Low success rate: {rate:.1}%"));
            }
            Some(rate)
        };

        if let Some(last) = last_success {
            let since_success = now.signed_duration_since(last);
            let stale = TimeDelta::from_std(self.stale_after).unwrap_or(TimeDelta::MAX);
            if since_success > stale {
                issues.push(format!(
                    "No successful run in {:.1} hours",
                    since_success.num_minutes() as f64 / 60.0
                ));
                degrade(&mut status);
            }
        }

        if let Some(kind) = current.and_then(|s| s.incident()) {
            issues.push(format!("Latest slot {kind}"));
            degrade(&mut status);
        }

        TargetHealth {
            status,
            recent_runs: recent.len(),
            recent_successes,
            success_rate,
            last_run,
            last_success,
            issues,
        }
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::from_config(&HealthConfig::default())
    }
}

fn degrade(status: &mut HealthStatus) {
    if *status == HealthStatus::Healthy {
        *status = HealthStatus::Degraded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use runwatch_core::SlotKey;

    fn at(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, h, 5, 0).unwrap()
    }

    fn run(day: u32, h: u32, outcome: Outcome) -> RunRecord {
        RunRecord {
            slot: SlotKey {
                target: "Worker".into(),
                date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
                expected_time: NaiveTime::from_hms_opt(h, 0, 0).unwrap(),
            },
            observed_at: at(day, h),
            outcome,
            message: None,
        }
    }

    #[test]
    fn all_recent_successes_are_healthy() {
        let records = vec![run(2, 0, Outcome::Success), run(2, 6, Outcome::Success)];
        let h = HealthPolicy::default().assess(&records, Some(ComplianceState::OnTime), at(2, 7));
        assert_eq!(h.status, HealthStatus::Healthy);
        assert_eq!(h.recent_runs, 2);
        assert_eq!(h.success_rate, Some(100.0));
        assert_eq!(h.last_success, Some(at(2, 6)));
        assert!(h.issues.is_empty());
    }

    #[test]
    fn low_success_rate_degrades() {
        let records = vec![
            run(2, 0, Outcome::Success),
            run(2, 6, Outcome::Failure),
            run(2, 12, Outcome::Success),
            run(2, 18, Outcome::Success),
        ];
        let h = HealthPolicy::default().assess(&records, None, at(2, 19));
        assert_eq!(h.status, HealthStatus::Degraded);
        assert_eq!(h.success_rate, Some(75.0));
        assert_eq!(h.issues, vec!["Low success rate: 75.0%"]);
    }

    #[test]
    fn no_recent_runs_is_inactive_and_stale() {
        let records = vec![run(1, 6, Outcome::Success)];
        let h = HealthPolicy::default().assess(&records, None, at(2, 12));
        assert_eq!(h.status, HealthStatus::Inactive);
        assert_eq!(h.recent_runs, 0);
        assert_eq!(h.success_rate, None);
        assert_eq!(h.last_run, Some(at(1, 6)));
        assert_eq!(h.issues.len(), 2);
        assert!(h.issues[1].contains("No successful run in 30.0 hours"), "{:?}", h.issues);
    }

    #[test]
    fn open_incident_degrades_healthy_target() {
        let records = vec![run(2, 0, Outcome::Success)];
        let h = HealthPolicy::default().assess(&records, Some(ComplianceState::Missed), at(2, 7));
        assert_eq!(h.status, HealthStatus::Degraded);
        assert_eq!(h.issues, vec!["Latest slot missed"]);
    }

    #[test]
    fn empty_ledger_is_inactive() {
        let h = HealthPolicy::default().assess(&[], None, at(2, 7));
        assert_eq!(h.status, HealthStatus::Inactive);
        assert_eq!(h.last_success, None);
        assert_eq!(h.issues, vec!["No runs reported in the last 1d"]);
    }
}
