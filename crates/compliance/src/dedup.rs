//! Alert suppression and escalation.
//!
//! Each `(target, incident kind)` pair runs a small state machine:
//! `quiet -> open -> open_repeated -> quiet`. The first non-compliant
//! observation alerts immediately. Repeats are suppressed until either the
//! cooldown since the last alert has elapsed or the repeat counter reaches
//! the target's escalation threshold, which raises severity to critical and
//! forces one re-alert. A compliant observation clears the entry and, when an
//! alert went out for it, produces a single resolve notice.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use runwatch_core::{Alert, AlertEvent, IncidentKind, Severity, SlotKey, Target};
use serde::Serialize;

use crate::evaluator::Evaluation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentPhase {
    Open,
    OpenRepeated,
}

/// Suppression state for one open incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressionEntry {
    pub target: String,
    pub kind: IncidentKind,
    /// Slot the incident currently refers to.
    pub slot: SlotKey,
    pub opened_at: DateTime<Utc>,
    pub last_alert_at: DateTime<Utc>,
    /// Non-compliant ticks observed since the incident opened, excluding the
    /// opening tick.
    pub repeats: u32,
    pub severity: Severity,
    pub phase: IncidentPhase,
    pub escalated: bool,
    pub alerts_sent: u32,
}

/// Why an observation did or did not produce an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Opened,
    NewSlot,
    Cooldown,
    Escalated,
    Suppressed,
    Resolved,
    Neutral,
}

pub struct AlertDeduplicator {
    cooldown: TimeDelta,
    entries: HashMap<(String, IncidentKind), SuppressionEntry>,
}

impl AlertDeduplicator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown: TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX),
            entries: HashMap::new(),
        }
    }

    /// Feed one evaluation. Returns the alert to send, if any.
    pub fn observe(
        &mut self,
        target: &Target,
        evaluation: &Evaluation,
        now: DateTime<Utc>,
    ) -> (Decision, Option<Alert>) {
        match evaluation.state.incident() {
            Some(kind) => self.observe_incident(target, evaluation, kind, now),
            None if evaluation.state.is_resolved() => self.resolve(target, evaluation, now),
            None => (Decision::Neutral, None),
        }
    }

    fn observe_incident(
        &mut self,
        target: &Target,
        evaluation: &Evaluation,
        kind: IncidentKind,
        now: DateTime<Utc>,
    ) -> (Decision, Option<Alert>) {
        let other = match kind {
            IncidentKind::Missed => IncidentKind::Failed,
            IncidentKind::Failed => IncidentKind::Missed,
        };
        if let Some(old) = self.entries.remove(&(target.name.clone(), other)) {
            tracing::debug!(
                target_name = %target.name,
                from = %old.kind,
                to = %kind,
                "incident kind superseded"
            );
        }

        let threshold = target.escalation_threshold;
        let key = (target.name.clone(), kind);

        let Some(entry) = self.entries.get_mut(&key) else {
            let (severity, escalated) = if threshold == 0 {
                (Severity::Critical, true)
            } else {
                (Severity::Warning, false)
            };
            let entry = SuppressionEntry {
                target: target.name.clone(),
                kind,
                slot: evaluation.slot.clone(),
                opened_at: now,
                last_alert_at: now,
                repeats: 0,
                severity,
                phase: IncidentPhase::Open,
                escalated,
                alerts_sent: 1,
            };
            let alert = build_alert(&entry, AlertEvent::Trigger, severity, target, evaluation, now);
            self.entries.insert(key, entry);
            return (Decision::Opened, Some(alert));
        };

        entry.repeats = entry.repeats.saturating_add(1);
        entry.phase = IncidentPhase::OpenRepeated;

        let escalate = !entry.escalated && entry.repeats >= threshold;
        if escalate {
            entry.escalated = true;
            entry.severity = Severity::Critical;
        }

        let decision = if entry.slot != evaluation.slot {
            entry.slot = evaluation.slot.clone();
            Decision::NewSlot
        } else if escalate {
            Decision::Escalated
        } else if now - entry.last_alert_at >= self.cooldown {
            Decision::Cooldown
        } else {
            tracing::debug!(
                target_name = %target.name,
                kind = %kind,
                repeats = entry.repeats,
                "alert suppressed"
            );
            return (Decision::Suppressed, None);
        };

        entry.last_alert_at = now;
        entry.alerts_sent += 1;
        let alert = build_alert(entry, AlertEvent::Trigger, entry.severity, target, evaluation, now);
        (decision, Some(alert))
    }

    fn resolve(
        &mut self,
        target: &Target,
        evaluation: &Evaluation,
        now: DateTime<Utc>,
    ) -> (Decision, Option<Alert>) {
        let mut closed: Vec<SuppressionEntry> = Vec::new();
        for kind in [IncidentKind::Missed, IncidentKind::Failed] {
            if let Some(entry) = self.entries.remove(&(target.name.clone(), kind)) {
                closed.push(entry);
            }
        }

        // At most one entry can be open per target; the latest-alerted one
        // names the resolve notice.
        match closed.into_iter().max_by_key(|e| e.last_alert_at) {
            Some(entry) if entry.alerts_sent > 0 => {
                let alert =
                    build_alert(&entry, AlertEvent::Resolve, Severity::Info, target, evaluation, now);
                (Decision::Resolved, Some(alert))
            }
            _ => (Decision::Neutral, None),
        }
    }

    pub fn entry(&self, target: &str, kind: IncidentKind) -> Option<&SuppressionEntry> {
        self.entries.get(&(target.to_string(), kind))
    }

    /// Every open incident, sorted by target.
    pub fn open_incidents(&self) -> Vec<SuppressionEntry> {
        let mut out: Vec<_> = self.entries.values().cloned().collect();
        out.sort_by(|a, b| a.target.cmp(&b.target).then(a.kind.cmp(&b.kind)));
        out
    }
}

fn build_alert(
    entry: &SuppressionEntry,
    event: AlertEvent,
    severity: Severity,
    target: &Target,
    evaluation: &Evaluation,
    now: DateTime<Utc>,
) -> Alert {
    Alert {
        target: target.name.clone(),
        kind: entry.kind,
        event,
        severity,
        message: evaluation.describe(target),
        slot: evaluation.slot.clone(),
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use runwatch_core::ComplianceState;

    fn publisher(threshold: u32) -> Target {
        Target {
            name: "Publisher".into(),
            description: None,
            expected_times: vec![NaiveTime::from_hms_opt(8, 0, 0).unwrap()],
            grace: TimeDelta::minutes(60),
            early: TimeDelta::minutes(30),
            escalation_threshold: threshold,
        }
    }

    fn eval(target: &Target, day: u32, state: ComplianceState, now: DateTime<Utc>) -> Evaluation {
        Evaluation {
            target: target.name.clone(),
            slot: target.slot(
                NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
                target.expected_times[0],
            ),
            state,
            record: None,
            evaluated_at: now,
        }
    }

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, h, m, 0).unwrap()
    }

    #[test]
    fn first_failure_alerts_at_warning() {
        let t = publisher(3);
        let mut dedup = AlertDeduplicator::new(Duration::from_secs(1800));
        let (d, alert) = dedup.observe(&t, &eval(&t, 2, ComplianceState::Failed, at(2, 8, 5)), at(2, 8, 5));
        assert_eq!(d, Decision::Opened);
        let alert = alert.unwrap();
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.kind, IncidentKind::Failed);
        assert_eq!(alert.event, AlertEvent::Trigger);
    }

    #[test]
    fn repeats_suppressed_until_escalation() {
        let t = publisher(3);
        let mut dedup = AlertDeduplicator::new(Duration::from_secs(1800));
        let mut sent = Vec::new();
        for minute in [5, 10, 15, 20, 25] {
            let now = at(2, 8, minute);
            if let (_, Some(a)) = dedup.observe(&t, &eval(&t, 2, ComplianceState::Failed, now), now) {
                sent.push((minute, a.severity));
            }
        }
        assert_eq!(sent, vec![(5, Severity::Warning), (20, Severity::Critical)]);
        let entry = dedup.entry("Publisher", IncidentKind::Failed).unwrap();
        assert!(entry.escalated);
        assert_eq!(entry.phase, IncidentPhase::OpenRepeated);
        assert_eq!(entry.repeats, 4);
    }

    #[test]
    fn cooldown_allows_repeat_at_current_severity() {
        let t = publisher(100);
        let mut dedup = AlertDeduplicator::new(Duration::from_secs(1800));
        let e = |now| eval(&t, 2, ComplianceState::Missed, now);
        assert!(dedup.observe(&t, &e(at(2, 9, 0)), at(2, 9, 0)).1.is_some());
        assert!(dedup.observe(&t, &e(at(2, 9, 5)), at(2, 9, 5)).1.is_none());
        let (d, alert) = dedup.observe(&t, &e(at(2, 9, 30)), at(2, 9, 30));
        assert_eq!(d, Decision::Cooldown);
        assert_eq!(alert.unwrap().severity, Severity::Warning);
    }

    #[test]
    fn new_slot_alerts_immediately_keeping_severity() {
        let t = publisher(1);
        let mut dedup = AlertDeduplicator::new(Duration::from_secs(86_400));
        dedup.observe(&t, &eval(&t, 2, ComplianceState::Missed, at(2, 9, 0)), at(2, 9, 0));
        let (d, _) = dedup.observe(&t, &eval(&t, 2, ComplianceState::Missed, at(2, 9, 5)), at(2, 9, 5));
        assert_eq!(d, Decision::Escalated);

        let (d, alert) =
            dedup.observe(&t, &eval(&t, 3, ComplianceState::Missed, at(3, 9, 0)), at(3, 9, 0));
        assert_eq!(d, Decision::NewSlot);
        let alert = alert.unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.slot.date, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    }

    #[test]
    fn recovery_emits_one_resolve_and_clears() {
        let t = publisher(3);
        let mut dedup = AlertDeduplicator::new(Duration::from_secs(1800));
        dedup.observe(&t, &eval(&t, 2, ComplianceState::Missed, at(2, 9, 0)), at(2, 9, 0));

        let (d, alert) =
            dedup.observe(&t, &eval(&t, 2, ComplianceState::Recovered, at(2, 9, 10)), at(2, 9, 10));
        assert_eq!(d, Decision::Resolved);
        let alert = alert.unwrap();
        assert_eq!(alert.event, AlertEvent::Resolve);
        assert_eq!(alert.severity, Severity::Info);
        assert_eq!(alert.kind, IncidentKind::Missed);
        assert!(dedup.open_incidents().is_empty());

        let (d, alert) =
            dedup.observe(&t, &eval(&t, 2, ComplianceState::OnTime, at(2, 9, 15)), at(2, 9, 15));
        assert_eq!(d, Decision::Neutral);
        assert!(alert.is_none());
    }

    #[test]
    fn late_is_neutral() {
        let t = publisher(1);
        let mut dedup = AlertDeduplicator::new(Duration::from_secs(1800));
        dedup.observe(&t, &eval(&t, 2, ComplianceState::Failed, at(2, 8, 5)), at(2, 8, 5));
        let (d, alert) = dedup.observe(&t, &eval(&t, 3, ComplianceState::Late, at(3, 8, 5)), at(3, 8, 5));
        assert_eq!(d, Decision::Neutral);
        assert!(alert.is_none());
        let entry = dedup.entry("Publisher", IncidentKind::Failed).unwrap();
        assert_eq!(entry.repeats, 0);
    }

    #[test]
    fn different_kind_supersedes_silently() {
        let t = publisher(3);
        let mut dedup = AlertDeduplicator::new(Duration::from_secs(1800));
        dedup.observe(&t, &eval(&t, 2, ComplianceState::Failed, at(2, 8, 5)), at(2, 8, 5));
        let (d, alert) =
            dedup.observe(&t, &eval(&t, 3, ComplianceState::Missed, at(3, 9, 0)), at(3, 9, 0));
        assert_eq!(d, Decision::Opened);
        assert_eq!(alert.unwrap().kind, IncidentKind::Missed);
        assert!(dedup.entry("Publisher", IncidentKind::Failed).is_none());
        assert_eq!(dedup.open_incidents().len(), 1);
    }
}
