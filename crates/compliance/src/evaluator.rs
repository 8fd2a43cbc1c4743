//! Per-tick classification of each target's most recently due slot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use runwatch_core::{ComplianceState, Outcome, RunRecord, SlotKey, Target};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerSnapshot;

/// Internal fault while classifying one target. Never aborts the tick for
/// other targets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// The calendar has no earlier day to fall back to.
    #[error("target '{target}': no slot is due at {now}")]
    NoDueSlot { target: String, now: String },
}

/// The result of classifying one slot at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub target: String,
    pub slot: SlotKey,
    pub state: ComplianceState,
    pub record: Option<RunRecord>,
    pub evaluated_at: DateTime<Utc>,
}

impl Evaluation {
    /// One-line human description used as the alert message.
    pub fn describe(&self, target: &Target) -> String {
        let deadline = self.slot.deadline(target.grace).format("%H:%M");
        let expected = self.slot.expected_at().format("%Y-%m-%d %H:%M");
        let note = self
            .record
            .as_ref()
            .and_then(|r| r.message.as_deref())
            .map(|m| format!(" ({m})"))
            .unwrap_or_default();

        match (self.state, &self.record) {
            (ComplianceState::Missed, Some(r)) if r.outcome == Outcome::Unknown => format!(
                "{} run expected at {expected} UTC reported an unknown outcome and no success by {deadline} UTC{note}",
                self.target
            ),
            (ComplianceState::Missed, _) => format!(
                "No successful {} run reported for {expected} UTC by the {deadline} UTC deadline",
                self.target
            ),
            (ComplianceState::Failed, Some(r)) => format!(
                "{} run expected at {expected} UTC reported failure at {} UTC{note}",
                self.target,
                r.observed_at.format("%H:%M")
            ),
            (_, Some(r)) if r.outcome == Outcome::Success => format!(
                "{} run expected at {expected} UTC completed at {} UTC",
                self.target,
                r.observed_at.format("%Y-%m-%d %H:%M")
            ),
            (state, _) => format!("{} run expected at {expected} UTC is {state}", self.target),
        }
    }
}

/// Classifies targets against a ledger snapshot.
///
/// Remembers the last state per target so a late success is reported as
/// `recovered` exactly once and as `on_time` afterwards.
#[derive(Debug)]
pub struct ComplianceEvaluator {
    watch_from: DateTime<Utc>,
    last_seen: HashMap<String, (SlotKey, ComplianceState)>,
}

impl ComplianceEvaluator {
    /// Slots expected before `watch_from` are never evaluated.
    pub fn new(watch_from: DateTime<Utc>) -> Self {
        Self {
            watch_from,
            last_seen: HashMap::new(),
        }
    }

    pub fn watch_from(&self) -> DateTime<Utc> {
        self.watch_from
    }

    /// Last classification per target.
    pub fn last_seen(&self, target: &str) -> Option<&(SlotKey, ComplianceState)> {
        self.last_seen.get(target)
    }

    /// Classify the most recently due slot of `target` at `now`.
    ///
    /// Returns `Ok(None)` when that slot predates the watch window.
    pub fn evaluate(
        &mut self,
        target: &Target,
        snapshot: &LedgerSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Option<Evaluation>, EvaluationError> {
        let slot = target
            .latest_slot_at_or_before(now)
            .ok_or_else(|| EvaluationError::NoDueSlot {
                target: target.name.clone(),
                now: now.to_rfc3339(),
            })?;

        if slot.expected_at() < self.watch_from {
            tracing::trace!(slot = %slot, watch_from = %self.watch_from, "slot predates watch window");
            return Ok(None);
        }

        let record = snapshot.get(&slot).cloned();

        let deadline = slot.deadline(target.grace);
        let state = match record.as_ref().map(|r| (r.outcome, r.observed_at)) {
            Some((Outcome::Success, observed)) if observed <= deadline => ComplianceState::OnTime,
            Some((Outcome::Success, _)) => self.late_success_state(&target.name, &slot),
            Some((Outcome::Failure, _)) => ComplianceState::Failed,
            Some((Outcome::Unknown, _)) | None if now < deadline => ComplianceState::Late,
            Some((Outcome::Unknown, _)) | None => ComplianceState::Missed,
        };

        self.last_seen.insert(target.name.clone(), (slot.clone(), state));
        tracing::debug!(target_name = %target.name, slot = %slot, %state, "slot classified");

        Ok(Some(Evaluation {
            target: target.name.clone(),
            slot,
            state,
            record,
            evaluated_at: now,
        }))
    }

    /// A success outside the grace window: `recovered` the first time it is
    /// seen, `on_time` once that has been reported.
    fn late_success_state(&self, target: &str, slot: &SlotKey) -> ComplianceState {
        match self.last_seen.get(target) {
            Some((seen, state)) if seen == slot && state.is_resolved() => ComplianceState::OnTime,
            _ => ComplianceState::Recovered,
        }
    }
}
