use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use runwatch_core::ComplianceState;
use serde::Serialize;

/// Operational counters exposed on the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineMetrics {
    pub ticks: u64,
    /// Ticks skipped because monitoring is disabled.
    pub ticks_skipped: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub avg_tick_duration: Duration,
    /// Classifications by state.
    pub states: HashMap<ComplianceState, u64>,
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    /// Alerts withheld because dispatch is disabled.
    pub alerts_withheld: u64,
    pub dispatch_failures: u64,
    pub status_report_failures: u64,
    pub evaluation_errors: u64,
    pub reports_accepted: u64,
    pub reports_rejected: u64,
}

impl EngineMetrics {
    /// Record a completed tick.
    pub fn record_tick(&mut self, at: DateTime<Utc>, duration: Duration) {
        self.ticks += 1;
        self.last_tick = Some(at);

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_tick_duration = if self.ticks == 1 {
            duration
        } else {
            let prev = self.avg_tick_duration.as_nanos() as f64;
            let cur = duration.as_nanos() as f64;
            Duration::from_nanos((prev + (cur - prev) / self.ticks as f64) as u64)
        };
    }

    pub fn record_state(&mut self, state: ComplianceState) {
        *self.states.entry(state).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_duration_averages() {
        let mut m = EngineMetrics::default();
        let now = Utc::now();
        m.record_tick(now, Duration::from_millis(100));
        m.record_tick(now, Duration::from_millis(200));

        assert_eq!(m.ticks, 2);
        assert_eq!(m.last_tick, Some(now));
        let avg = m.avg_tick_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {avg}ms");
    }

    #[test]
    fn states_are_counted() {
        let mut m = EngineMetrics::default();
        m.record_state(ComplianceState::Late);
        m.record_state(ComplianceState::Late);
        m.record_state(ComplianceState::Missed);
        assert_eq!(m.states[&ComplianceState::Late], 2);
        assert_eq!(m.states[&ComplianceState::Missed], 1);
    }
}
