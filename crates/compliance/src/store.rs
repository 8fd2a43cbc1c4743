//! Persistence backends for the run ledger.
//!
//! The ledger itself lives in memory; a store only lets it survive restarts
//! so already-reported runs are not re-alerted. Store failures are never
//! fatal to the ledger.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use runwatch_core::RunRecord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("ledger store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger store serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable backing for ledger writes.
pub trait LedgerStore: Send + Sync {
    /// Persist one accepted record.
    fn append(&self, record: &RunRecord) -> Result<(), StoreError>;

    /// Every persisted record, oldest first. Later entries for the same slot
    /// supersede earlier ones.
    fn load(&self) -> Result<Vec<RunRecord>, StoreError>;

    /// Replace the persisted contents with exactly `records`.
    fn compact(&self, records: &[RunRecord]) -> Result<(), StoreError>;

    fn name(&self) -> &str;
}

/// Keeps nothing. The ledger starts empty on every restart.
#[derive(Debug, Default)]
pub struct MemoryStore;

impl LedgerStore for MemoryStore {
    fn append(&self, _record: &RunRecord) -> Result<(), StoreError> {
        Ok(())
    }

    fn load(&self) -> Result<Vec<RunRecord>, StoreError> {
        Ok(Vec::new())
    }

    fn compact(&self, _records: &[RunRecord]) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Append-only JSON-lines file, one [`RunRecord`] per line.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesStore {
    /// Use `path`, creating parent directories as needed. The file itself is
    /// created on first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for JsonLinesStore {
    fn append(&self, record: &RunRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().expect("ledger store lock poisoned");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<RunRecord>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = idx + 1,
                    error = %e,
                    "skipping unreadable ledger line"
                ),
            }
        }
        Ok(records)
    }

    fn compact(&self, records: &[RunRecord]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("ledger store lock poisoned");
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for record in records {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use runwatch_core::{Outcome, SlotKey};

    fn record(hour: u32, outcome: Outcome) -> RunRecord {
        RunRecord {
            slot: SlotKey {
                target: "Worker".into(),
                date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                expected_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            },
            observed_at: Utc.with_ymd_and_hms(2026, 3, 2, hour, 5, 0).unwrap(),
            outcome,
            message: None,
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesStore::open(dir.path().join("ledger.jsonl")).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn append_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesStore::open(dir.path().join("nested/ledger.jsonl")).unwrap();
        store.append(&record(6, Outcome::Failure)).unwrap();
        store.append(&record(6, Outcome::Success)).unwrap();
        store.append(&record(12, Outcome::Success)).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].outcome, Outcome::Failure);
        assert_eq!(loaded[1].outcome, Outcome::Success);
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let store = JsonLinesStore::open(&path).unwrap();
        store.append(&record(6, Outcome::Success)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{not json\n\n")
            .unwrap();
        store.append(&record(12, Outcome::Success)).unwrap();

        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn compact_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesStore::open(dir.path().join("ledger.jsonl")).unwrap();
        for h in [0, 6, 12, 18] {
            store.append(&record(h, Outcome::Success)).unwrap();
        }
        store.compact(&[record(18, Outcome::Success)]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].slot.expected_time.format("%H").to_string(), "18");
    }
}
