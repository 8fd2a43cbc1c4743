use std::collections::HashSet;

use chrono::TimeDelta;

use crate::error::ConfigError;
use crate::schedule::{parse_time_of_day, Target};

use super::types::{MonitorConfig, TargetConfig};

impl MonitorConfig {
    /// Validate the config: schedules, alert channels, loop timing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_loop_timing()?;
        self.validate_health()?;
        let targets = self.build_targets()?;
        self.validate_email()?;
        self.validate_status_api()?;

        if let Some(finest) = targets.iter().map(|t| t.grace).min() {
            let tick = TimeDelta::from_std(self.monitoring.tick_interval).unwrap_or(TimeDelta::MAX);
            if tick > finest && finest > TimeDelta::zero() {
                tracing::warn!(
                    tick_secs = self.monitoring.tick_interval.as_secs(),
                    grace_secs = finest.num_seconds(),
                    "tick interval is longer than the shortest grace period; misses will be reported late"
                );
            }
        }
        Ok(())
    }

    /// Build validated [`Target`]s in config order.
    ///
    /// Rejects empty or duplicate target names on top of the per-target checks
    /// in [`TargetConfig::to_target`].
    pub fn build_targets(&self) -> Result<Vec<Target>, ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::Invalid("at least one target is required".into()));
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());
        for cfg in &self.targets {
            if !seen.insert(cfg.name.as_str()) {
                return Err(ConfigError::target(&cfg.name, "duplicate target name"));
            }
            targets.push(cfg.to_target(self.monitoring.escalation_threshold)?);
        }
        Ok(targets)
    }

    fn validate_health(&self) -> Result<(), ConfigError> {
        let health = &self.monitoring.health;
        if health.window.is_zero() {
            return Err(ConfigError::Invalid(
                "monitoring.health.window must be greater than zero".into(),
            ));
        }
        if !(0.0..=100.0).contains(&health.min_success_rate) {
            return Err(ConfigError::Invalid(
                "monitoring.health.min_success_rate must be between 0 and 100".into(),
            ));
        }
        Ok(())
    }

    fn validate_loop_timing(&self) -> Result<(), ConfigError> {
        if self.monitoring.tick_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "monitoring.tick_interval must be greater than zero".into(),
            ));
        }
        if self.monitoring.dispatch_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "monitoring.dispatch_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn validate_email(&self) -> Result<(), ConfigError> {
        let Some(email) = &self.email else {
            return Ok(());
        };
        if email.smtp_host.trim().is_empty() {
            return Err(ConfigError::Invalid("email.smtp_host is empty".into()));
        }
        if email.from.trim().is_empty() {
            return Err(ConfigError::Invalid("email.from is empty".into()));
        }
        if email.to.is_empty() {
            return Err(ConfigError::Invalid(
                "email.to needs at least one recipient".into(),
            ));
        }
        Ok(())
    }

    fn validate_status_api(&self) -> Result<(), ConfigError> {
        match &self.status_api {
            Some(api) if api.url.trim().is_empty() => {
                Err(ConfigError::Invalid("status_api.url is empty".into()))
            }
            _ => Ok(()),
        }
    }
}

impl TargetConfig {
    /// Turn this entry into a [`Target`].
    ///
    /// Fails when the name is blank, no times are listed, a time is malformed,
    /// two times coincide, or the escalation threshold is zero. Grace plus the
    /// early window must also fit inside the shortest gap between expected
    /// times, otherwise a later slot would hide a miss of the earlier one.
    pub fn to_target(&self, default_threshold: u32) -> Result<Target, ConfigError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Invalid("target name is empty".into()));
        }
        if self.times.is_empty() {
            return Err(ConfigError::target(name, "no expected run times"));
        }

        let mut expected_times = Vec::with_capacity(self.times.len());
        for raw in &self.times {
            let t = parse_time_of_day(raw).ok_or_else(|| {
                ConfigError::target(name, format!("malformed time '{raw}', expected HH:MM"))
            })?;
            expected_times.push(t);
        }
        expected_times.sort();
        if let Some(w) = expected_times.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::target(
                name,
                format!("expected time {} listed twice", w[0].format("%H:%M:%S")),
            ));
        }

        let escalation_threshold = self.escalation_threshold.unwrap_or(default_threshold);
        if escalation_threshold == 0 {
            return Err(ConfigError::target(name, "escalation threshold must be at least 1"));
        }

        let grace = TimeDelta::from_std(self.grace)
            .map_err(|_| ConfigError::target(name, "grace period out of range"))?;
        let early = TimeDelta::from_std(self.early)
            .map_err(|_| ConfigError::target(name, "early window out of range"))?;

        let target = Target {
            name: name.to_string(),
            description: self.description.clone(),
            expected_times,
            grace,
            early,
            escalation_threshold,
        };

        let gap = target.shortest_gap();
        if grace.checked_add(&early).map_or(true, |span| span >= gap) {
            return Err(ConfigError::target(
                name,
                format!(
                    "grace {}m plus early window {}m must be shorter than the {}m between expected times",
                    grace.num_minutes(),
                    early.num_minutes(),
                    gap.num_minutes()
                ),
            ));
        }
        Ok(target)
    }
}
