use std::path::Path;

use crate::duration::{format_duration, parse_duration};
use crate::error::ConfigError;

use super::types::MonitorConfig;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

impl MonitorConfig {
    /// Parse config from a TOML string, apply env overrides, and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load from `path` when it exists, otherwise start from the built-in
    /// defaults. Env overrides and validation apply either way.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            tracing::info!(path = %path.display(), "loading monitor config");
            return Self::from_file(path);
        }

        tracing::warn!(
            path = %path.display(),
            "config file not found, using built-in schedule"
        );
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `RUNWATCH_SECTION_KEY` overrides `section.key`.
    /// Examples:
    /// - `RUNWATCH_MONITORING_ENABLED` -> `monitoring.enabled`
    /// - `RUNWATCH_MONITORING_TICK_INTERVAL` -> `monitoring.tick_interval`
    /// - `RUNWATCH_MONITORING_ALERT_COOLDOWN` -> `monitoring.alert_cooldown`
    /// - `RUNWATCH_MONITORING_ESCALATION_THRESHOLD` -> `monitoring.escalation_threshold`
    /// - `RUNWATCH_ALERTS_ENABLED` -> `alerts.enabled`
    /// - `RUNWATCH_ALERTS_SUBJECT_PREFIX` -> `alerts.subject_prefix`
    /// - `RUNWATCH_STATUS_API_URL` -> `status_api.url`
    /// - `RUNWATCH_STATUS_API_KEY` -> `status_api.api_key`
    /// - `RUNWATCH_SERVER_HOST` / `RUNWATCH_SERVER_PORT` -> `server.*`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool("RUNWATCH_MONITORING_ENABLED") {
            self.monitoring.enabled = v;
        }
        if let Some(d) = env_duration("RUNWATCH_MONITORING_TICK_INTERVAL") {
            self.monitoring.tick_interval = d;
        }
        if let Some(d) = env_duration("RUNWATCH_MONITORING_ALERT_COOLDOWN") {
            self.monitoring.alert_cooldown = d;
        }
        if let Ok(v) = std::env::var("RUNWATCH_MONITORING_ESCALATION_THRESHOLD") {
            if let Ok(n) = v.parse::<u32>() {
                self.monitoring.escalation_threshold = n;
            }
        }
        if let Some(v) = env_bool("RUNWATCH_ALERTS_ENABLED") {
            self.alerts.enabled = v;
        }
        if let Ok(v) = std::env::var("RUNWATCH_ALERTS_SUBJECT_PREFIX") {
            self.alerts.subject_prefix = v;
        }
        if let Ok(v) = std::env::var("RUNWATCH_STATUS_API_URL") {
            match self.status_api.as_mut() {
                Some(api) => api.url = v,
                None => {
                    self.status_api = Some(super::types::StatusApiConfig {
                        url: v,
                        api_key: None,
                        timeout: self.monitoring.dispatch_timeout,
                    })
                }
            }
        }
        if let Ok(v) = std::env::var("RUNWATCH_STATUS_API_KEY") {
            if let Some(api) = self.status_api.as_mut() {
                api.api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("RUNWATCH_SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("RUNWATCH_SERVER_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.server.port = port;
            }
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  monitoring:  enabled={}, tick={}, cooldown={}, escalate_after={}",
            self.monitoring.enabled,
            format_duration(self.monitoring.tick_interval),
            format_duration(self.monitoring.alert_cooldown),
            self.monitoring.escalation_threshold
        );
        tracing::info!(
            "  alerts:      enabled={}, email={}, status_api={}",
            self.alerts.enabled,
            self.email.is_some(),
            self.status_api.is_some()
        );
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        for t in &self.targets {
            tracing::info!(
                "  target:      {} at [{}] UTC, grace={}, early={}",
                t.name,
                t.times.join(", "),
                format_duration(t.grace),
                format_duration(t.early)
            );
        }
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "monitoring": {
                "enabled": self.monitoring.enabled,
                "tick_interval": format_duration(self.monitoring.tick_interval),
                "alert_cooldown": format_duration(self.monitoring.alert_cooldown),
                "escalation_threshold": self.monitoring.escalation_threshold,
                "startup_lookback": format_duration(self.monitoring.startup_lookback),
                "health_window": format_duration(self.monitoring.health.window),
            },
            "alerts": {
                "enabled": self.alerts.enabled,
                "email_configured": self.email.is_some(),
                "status_api_configured": self.status_api.is_some(),
            },
            "targets": self.targets.iter().map(|t| serde_json::json!({
                "name": t.name,
                "times": t.times,
                "grace": format_duration(t.grace),
                "early": format_duration(t.early),
            })).collect::<Vec<_>>(),
        })
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %v, "ignoring non-boolean override");
            None
        }
    }
}

fn env_duration(key: &str) -> Option<std::time::Duration> {
    let v = std::env::var(key).ok()?;
    let parsed = parse_duration(&v);
    if parsed.is_none() {
        tracing::warn!(key, value = %v, "ignoring unparseable duration override");
    }
    parsed
}
