//! The run ledger: observed run outcomes keyed by schedule slot.
//!
//! Written by the inbound report path, read by the evaluation loop through
//! point-in-time snapshots. Writes are serialized behind a `RwLock`; a
//! snapshot is a clone taken under the read lock, so an evaluator never sees
//! a half-applied report.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use runwatch_core::{Outcome, RunRecord, RunReport, SlotKey, ValidationError};
use serde::Serialize;

use crate::registry::ScheduleRegistry;
use crate::store::{LedgerStore, MemoryStore, StoreError};

/// What a write did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum RecordOutcome {
    Inserted,
    /// Same outcome resubmitted; the original record is kept.
    Unchanged,
    /// A different outcome superseded the previous record.
    Replaced { previous: Outcome },
}

/// Immutable copy of the ledger at one instant.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    records: HashMap<SlotKey, RunRecord>,
}

impl LedgerSnapshot {
    pub fn get(&self, slot: &SlotKey) -> Option<&RunRecord> {
        self.records.get(slot)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.values()
    }
}

pub struct RunLedger {
    registry: Arc<ScheduleRegistry>,
    records: RwLock<HashMap<SlotKey, RunRecord>>,
    store: Box<dyn LedgerStore>,
    future_skew: TimeDelta,
}

impl RunLedger {
    /// In-memory ledger with a 5 minute future-skew allowance.
    pub fn new(registry: Arc<ScheduleRegistry>) -> Self {
        Self {
            registry,
            records: RwLock::new(HashMap::new()),
            store: Box::new(MemoryStore),
            future_skew: TimeDelta::minutes(5),
        }
    }

    /// Ledger backed by `store`, replaying whatever it already holds.
    ///
    /// Replayed records for targets or times no longer in the registry are
    /// dropped with a warning.
    pub fn with_store(
        registry: Arc<ScheduleRegistry>,
        store: Box<dyn LedgerStore>,
    ) -> Result<Self, StoreError> {
        let mut records = HashMap::new();
        let mut dropped = 0usize;
        for record in store.load()? {
            if registry.knows_slot(&record.slot) {
                records.insert(record.slot.clone(), record);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!(
                store = store.name(),
                dropped,
                "ignored persisted runs for unknown targets or slots"
            );
        }
        tracing::info!(store = store.name(), records = records.len(), "run ledger loaded");

        Ok(Self {
            registry,
            records: RwLock::new(records),
            store,
            future_skew: TimeDelta::minutes(5),
        })
    }

    pub fn with_future_skew(mut self, skew: TimeDelta) -> Self {
        self.future_skew = skew;
        self
    }

    pub fn registry(&self) -> &Arc<ScheduleRegistry> {
        &self.registry
    }

    /// Write a run record for `slot`.
    ///
    /// Resubmitting the same outcome is a no-op. A different outcome replaces
    /// the record and logs a warning.
    pub fn record(
        &self,
        slot: SlotKey,
        outcome: Outcome,
        observed_at: DateTime<Utc>,
        message: Option<String>,
    ) -> Result<RecordOutcome, ValidationError> {
        if self.registry.target(&slot.target).is_none() {
            return Err(ValidationError::UnknownTarget(slot.target));
        }
        if !self.registry.knows_slot(&slot) {
            return Err(ValidationError::UnknownSlot {
                target: slot.target,
                time: slot.expected_time.format("%H:%M:%S").to_string(),
            });
        }

        let record = RunRecord {
            slot,
            observed_at,
            outcome,
            message,
        };

        // The store is written under the same lock so its order matches memory.
        let mut guard = self.records.write().expect("run ledger lock poisoned");
        let result = match guard.get(&record.slot) {
            Some(existing) if existing.outcome == outcome => return Ok(RecordOutcome::Unchanged),
            Some(existing) => {
                let previous = existing.outcome;
                tracing::warn!(
                    slot = %record.slot,
                    %previous,
                    current = %outcome,
                    "run report replaces an earlier outcome"
                );
                RecordOutcome::Replaced { previous }
            }
            None => RecordOutcome::Inserted,
        };
        guard.insert(record.slot.clone(), record.clone());
        if let Err(e) = self.store.append(&record) {
            tracing::error!(store = self.store.name(), slot = %record.slot, error = %e, "failed to persist run record");
        }
        drop(guard);

        tracing::debug!(slot = %record.slot, outcome = %record.outcome, ?result, "run recorded");
        Ok(result)
    }

    /// Validate an inbound report and record it against the slot it completes.
    ///
    /// The slot is the next expected time when the report lands within the
    /// target's early window before it, otherwise the latest expected time at
    /// or before the report timestamp. Timestamps further than the skew
    /// allowance ahead of `now` are rejected.
    pub fn ingest(
        &self,
        report: &RunReport,
        now: DateTime<Utc>,
    ) -> Result<(SlotKey, RecordOutcome), ValidationError> {
        if self.registry.target(&report.target).is_none() {
            return Err(ValidationError::UnknownTarget(report.target.clone()));
        }

        let observed_at = DateTime::parse_from_rfc3339(report.timestamp.trim())
            .map_err(|e| ValidationError::MalformedTimestamp {
                value: report.timestamp.clone(),
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        if observed_at > now + self.future_skew {
            return Err(ValidationError::FutureTimestamp {
                timestamp: observed_at.to_rfc3339(),
                now: now.to_rfc3339(),
            });
        }

        let slot = self
            .registry
            .completion_slot(&report.target, observed_at)
            .ok_or_else(|| ValidationError::UnknownSlot {
                target: report.target.clone(),
                time: observed_at.format("%H:%M:%S").to_string(),
            })?;

        let outcome = self.record(slot.clone(), report.outcome, observed_at, report.message.clone())?;
        Ok((slot, outcome))
    }

    pub fn lookup(&self, slot: &SlotKey) -> Option<RunRecord> {
        self.records
            .read()
            .expect("run ledger lock poisoned")
            .get(slot)
            .cloned()
    }

    /// Consistent point-in-time copy of every record.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let guard = self.records.read().expect("run ledger lock poisoned");
        LedgerSnapshot {
            records: guard.clone(),
        }
    }

    /// Records for one target, newest slot first.
    pub fn records_for(&self, target: &str) -> Vec<RunRecord> {
        let guard = self.records.read().expect("run ledger lock poisoned");
        let mut out: Vec<RunRecord> = guard
            .values()
            .filter(|r| r.slot.target == target)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.slot.cmp(&a.slot));
        out
    }

    /// Drop records for slots dated before `date` and compact the store.
    ///
    /// Returns the number of records removed.
    pub fn prune_before(&self, date: NaiveDate) -> usize {
        let mut guard = self.records.write().expect("run ledger lock poisoned");
        let before = guard.len();
        guard.retain(|slot, _| slot.date >= date);
        let removed = before - guard.len();

        if removed > 0 {
            let mut remaining: Vec<RunRecord> = guard.values().cloned().collect();
            remaining.sort_by(|a, b| a.slot.cmp(&b.slot));
            // Held across compaction so no append lands in the file being replaced.
            if let Err(e) = self.store.compact(&remaining) {
                tracing::error!(store = self.store.name(), error = %e, "failed to compact ledger store");
            }
            tracing::info!(removed, %date, "pruned old run records");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("run ledger lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
