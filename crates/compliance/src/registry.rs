//! Static registry of monitored targets and their expected run slots.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use runwatch_core::{ConfigError, MonitorConfig, SlotKey, Target};

/// Every monitored target, loaded once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ScheduleRegistry {
    targets: Vec<Target>,
    by_name: HashMap<String, usize>,
}

impl ScheduleRegistry {
    /// Build a registry from already validated targets.
    ///
    /// Rejects an empty list and duplicate names.
    pub fn new(targets: Vec<Target>) -> Result<Self, ConfigError> {
        if targets.is_empty() {
            return Err(ConfigError::Invalid("at least one target is required".into()));
        }

        let mut by_name = HashMap::with_capacity(targets.len());
        for (idx, target) in targets.iter().enumerate() {
            if by_name.insert(target.name.clone(), idx).is_some() {
                return Err(ConfigError::Target {
                    target: target.name.clone(),
                    reason: "duplicate target name".into(),
                });
            }
        }

        Ok(Self { targets, by_name })
    }

    /// Build the registry from the `[[targets]]` section.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        Self::new(config.build_targets()?)
    }

    /// Targets in config order.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.by_name.get(name).map(|idx| &self.targets[*idx])
    }

    /// Slots `name` is expected to fill on `date`, in time order.
    ///
    /// Empty for an unknown target.
    pub fn slots_due_on(&self, name: &str, date: NaiveDate) -> Vec<SlotKey> {
        self.target(name)
            .map(|t| t.slots_on(date))
            .unwrap_or_default()
    }

    /// The most recently due slot for `name` as of `now`.
    pub fn latest_due_slot(&self, name: &str, now: DateTime<Utc>) -> Option<SlotKey> {
        self.target(name)?.latest_slot_at_or_before(now)
    }

    /// The slot a run of `name` completing at `at` fills, honouring the
    /// target's early window.
    pub fn completion_slot(&self, name: &str, at: DateTime<Utc>) -> Option<SlotKey> {
        self.target(name)?.slot_for_completion(at)
    }

    /// Whether `slot` is one this registry would ever produce.
    pub fn knows_slot(&self, slot: &SlotKey) -> bool {
        self.target(&slot.target)
            .is_some_and(|t| t.expects(slot.expected_time))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn registry() -> ScheduleRegistry {
        ScheduleRegistry::from_config(&MonitorConfig::default()).unwrap()
    }

    #[test]
    fn default_registry_has_worker_and_publisher() {
        let reg = registry();
        let names: Vec<_> = reg.targets().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Worker", "Publisher"]);
        assert!(reg.target("Worker").is_some());
        assert!(reg.target("worker").is_none());
    }

    #[test]
    fn slots_due_on_are_time_ordered() {
        let reg = registry();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let times: Vec<_> = reg
            .slots_due_on("Worker", date)
            .into_iter()
            .map(|s| s.expected_time.format("%H:%M").to_string())
            .collect();
        assert_eq!(times, ["00:00", "06:00", "12:00", "18:00"]);
        assert!(reg.slots_due_on("Nobody", date).is_empty());
    }

    #[test]
    fn latest_due_slot_before_first_run_falls_back_to_yesterday() {
        let reg = registry();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();
        let slot = reg.latest_due_slot("Publisher", now).unwrap();
        assert_eq!(slot.date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(slot.expected_time, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn knows_slot_checks_time_and_target() {
        let reg = registry();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 6, 10, 0).unwrap();
        let mut slot = reg.latest_due_slot("Worker", now).unwrap();
        assert!(reg.knows_slot(&slot));
        slot.expected_time = NaiveTime::from_hms_opt(7, 0, 0).unwrap();
        assert!(!reg.knows_slot(&slot));
        slot.target = "Ghost".into();
        assert!(!reg.knows_slot(&slot));
    }

    #[test]
    fn duplicate_names_rejected() {
        let target = registry().targets()[0].clone();
        let err = ScheduleRegistry::new(vec![target.clone(), target]).unwrap_err();
        assert!(err.to_string().contains("duplicate target name"));
    }

    #[test]
    fn empty_registry_rejected() {
        assert!(ScheduleRegistry::new(Vec::new()).is_err());
    }
}
