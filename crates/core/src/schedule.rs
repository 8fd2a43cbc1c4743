use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Parse a UTC time-of-day written as `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// A monitored batch process and the daily times it is expected to finish.
///
/// Built once from configuration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub description: Option<String>,
    /// Expected completion times (UTC), sorted ascending, never empty.
    pub expected_times: Vec<NaiveTime>,
    /// How long after an expected time a run may still complete on time.
    pub grace: TimeDelta,
    /// How long before an expected time a completion still counts toward it.
    pub early: TimeDelta,
    /// Consecutive non-compliant ticks before an incident escalates.
    pub escalation_threshold: u32,
}

impl Target {
    /// The slot this target is expected to fill at `time` on `date`.
    pub fn slot(&self, date: NaiveDate, time: NaiveTime) -> SlotKey {
        SlotKey {
            target: self.name.clone(),
            date,
            expected_time: time,
        }
    }

    /// All slots expected on `date`, in time order.
    pub fn slots_on(&self, date: NaiveDate) -> Vec<SlotKey> {
        self.expected_times
            .iter()
            .map(|t| self.slot(date, *t))
            .collect()
    }

    /// The most recent slot whose expected time is at or before `instant`.
    ///
    /// Falls back to the last slot of the previous day when nothing is due
    /// yet today.
    pub fn latest_slot_at_or_before(&self, instant: DateTime<Utc>) -> Option<SlotKey> {
        let today = instant.date_naive();
        let time = instant.time();

        if let Some(t) = self.expected_times.iter().rev().find(|t| **t <= time) {
            return Some(self.slot(today, *t));
        }

        let yesterday = today.pred_opt()?;
        self.expected_times.last().map(|t| self.slot(yesterday, *t))
    }

    /// The first slot whose expected time is strictly after `instant`.
    pub fn next_slot_after(&self, instant: DateTime<Utc>) -> Option<SlotKey> {
        let today = instant.date_naive();
        let time = instant.time();

        if let Some(t) = self.expected_times.iter().find(|t| **t > time) {
            return Some(self.slot(today, *t));
        }

        let tomorrow = today.succ_opt()?;
        self.expected_times.first().map(|t| self.slot(tomorrow, *t))
    }

    /// The slot a run completing at `instant` fills.
    ///
    /// A completion up to `early` before an expected time belongs to that
    /// upcoming slot; anything else belongs to the latest slot already due.
    pub fn slot_for_completion(&self, instant: DateTime<Utc>) -> Option<SlotKey> {
        if let Some(next) = self.next_slot_after(instant) {
            if next.expected_at() - instant <= self.early {
                return Some(next);
            }
        }
        self.latest_slot_at_or_before(instant)
    }

    /// Shortest distance between two consecutive expected times, wrapping
    /// around midnight. A single daily time gives a full day.
    pub fn shortest_gap(&self) -> TimeDelta {
        let day = TimeDelta::days(1);
        let wrap = match (self.expected_times.first(), self.expected_times.last()) {
            (Some(first), Some(last)) => (*first - *last) + day,
            _ => day,
        };
        self.expected_times
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(wrap, |a, b| a.min(b))
    }

    /// Whether `time` is one of this target's expected times.
    pub fn expects(&self, time: NaiveTime) -> bool {
        self.expected_times.binary_search(&time).is_ok()
    }

    /// Comma-separated `HH:MM` list for human-facing text.
    pub fn schedule_label(&self) -> String {
        self.expected_times
            .iter()
            .map(|t| t.format("%H:%M").to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One expected occurrence of a target: the ledger key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub target: String,
    pub date: NaiveDate,
    pub expected_time: NaiveTime,
}

impl SlotKey {
    pub fn expected_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.expected_time).and_utc()
    }

    /// Last instant a run can complete and still count as on time.
    pub fn deadline(&self, grace: TimeDelta) -> DateTime<Utc> {
        self.expected_at() + grace
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}T{}Z",
            self.target,
            self.date,
            self.expected_time.format("%H:%M")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> Target {
        Target {
            name: "Worker".to_string(),
            description: None,
            expected_times: ["00:00", "06:00", "12:00", "18:00"]
                .iter()
                .map(|t| parse_time_of_day(t).unwrap())
                .collect(),
            grace: TimeDelta::minutes(30),
            early: TimeDelta::minutes(15),
            escalation_threshold: 3,
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn parses_time_of_day_formats() {
        assert_eq!(parse_time_of_day("06:00"), NaiveTime::from_hms_opt(6, 0, 0));
        assert_eq!(parse_time_of_day("23:59:30"), NaiveTime::from_hms_opt(23, 59, 30));
        assert_eq!(parse_time_of_day(" 8:05 "), NaiveTime::from_hms_opt(8, 5, 0));
        assert_eq!(parse_time_of_day("24:00"), None);
        assert_eq!(parse_time_of_day("noon"), None);
    }

    #[test]
    fn latest_slot_picks_most_recent_time_today() {
        let slot = worker()
            .latest_slot_at_or_before(at("2026-03-02T13:15:00Z"))
            .unwrap();
        assert_eq!(slot.date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(slot.expected_time, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }

    #[test]
    fn latest_slot_includes_exact_instant() {
        let slot = worker()
            .latest_slot_at_or_before(at("2026-03-02T06:00:00Z"))
            .unwrap();
        assert_eq!(slot.expected_time, NaiveTime::from_hms_opt(6, 0, 0).unwrap());
    }

    #[test]
    fn latest_slot_falls_back_to_previous_day() {
        let mut publisher = worker();
        publisher.expected_times = vec![NaiveTime::from_hms_opt(8, 0, 0).unwrap()];

        let slot = publisher
            .latest_slot_at_or_before(at("2026-03-02T07:59:00Z"))
            .unwrap();
        assert_eq!(slot.date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(slot.expected_time, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn early_completion_fills_the_upcoming_slot() {
        let w = worker();
        let slot = w.slot_for_completion(at("2026-03-02T05:50:00Z")).unwrap();
        assert_eq!(slot.expected_time, NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        assert_eq!(slot.date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());

        // Outside the early window the run still closes the previous slot.
        let slot = w.slot_for_completion(at("2026-03-02T05:40:00Z")).unwrap();
        assert_eq!(slot.expected_time, NaiveTime::from_hms_opt(0, 0, 0).unwrap());

        // Crossing midnight lands on tomorrow's first slot.
        let slot = w.slot_for_completion(at("2026-03-02T23:50:00Z")).unwrap();
        assert_eq!(slot.date, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        assert_eq!(slot.expected_time, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn shortest_gap_wraps_midnight() {
        let mut t = worker();
        assert_eq!(t.shortest_gap(), TimeDelta::hours(6));

        t.expected_times = vec![
            NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        ];
        assert_eq!(t.shortest_gap(), TimeDelta::hours(2));

        t.expected_times.truncate(1);
        assert_eq!(t.shortest_gap(), TimeDelta::days(1));
    }

    #[test]
    fn slots_on_lists_every_expected_time() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let slots = worker().slots_on(date);
        assert_eq!(slots.len(), 4);
        assert!(slots.windows(2).all(|w| w[0] < w[1]));
        assert!(slots.iter().all(|s| s.date == date && s.target == "Worker"));
    }

    #[test]
    fn deadline_adds_grace() {
        let slot = worker()
            .latest_slot_at_or_before(at("2026-03-02T06:10:00Z"))
            .unwrap();
        assert_eq!(slot.deadline(TimeDelta::minutes(30)), at("2026-03-02T06:30:00Z"));
        assert_eq!(slot.to_string(), "Worker@2026-03-02T06:00Z");
    }
}
