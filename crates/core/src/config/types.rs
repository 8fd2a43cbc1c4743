use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::serde_str;

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Tick cadence, alert pacing, and loop timeouts.
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Alert dispatch toggle and message rendering.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// SMTP channel. Absent means no email alerts.
    #[serde(default)]
    pub email: Option<EmailConfig>,

    /// External status backend. Absent means no status reporting.
    #[serde(default)]
    pub status_api: Option<StatusApiConfig>,

    /// Inbound report API listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Monitored processes.
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitoring: MonitoringConfig::default(),
            alerts: AlertsConfig::default(),
            email: None,
            status_api: None,
            server: ServerConfig::default(),
            targets: default_targets(),
        }
    }
}

// ── Section configs ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Master switch. When off the loop keeps ticking but evaluates nothing.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_tick_interval", with = "serde_str")]
    pub tick_interval: Duration,

    /// Minimum gap between repeated alerts for the same open incident.
    #[serde(default = "default_alert_cooldown", with = "serde_str")]
    pub alert_cooldown: Duration,

    /// Default escalation threshold for targets that don't set one.
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,

    /// Upper bound for one outbound call (SMTP send, status API request).
    #[serde(default = "default_dispatch_timeout", with = "serde_str")]
    pub dispatch_timeout: Duration,

    /// Pause before the single retry of a failed dispatch.
    #[serde(default = "default_retry_backoff", with = "serde_str")]
    pub retry_backoff: Duration,

    /// How long an in-flight tick may keep running after shutdown is requested.
    #[serde(default = "default_drain_timeout", with = "serde_str")]
    pub drain_timeout: Duration,

    /// How far before startup slots are still evaluated. The default day
    /// covers every target's most recent slot, so a restart after a deadline
    /// still reports the miss.
    #[serde(default = "default_startup_lookback", with = "serde_str")]
    pub startup_lookback: Duration,

    /// Tolerated clock skew for report timestamps ahead of the monitor.
    #[serde(default = "default_future_skew", with = "serde_str")]
    pub future_skew: Duration,

    /// Ledger records older than this are pruned.
    #[serde(default = "default_retention", with = "serde_str")]
    pub retention: Duration,

    /// Post a monitor heartbeat to the status API on every tick.
    #[serde(default = "default_true")]
    pub heartbeat: bool,

    /// Append-only JSON-lines file backing the run ledger.
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,

    /// Per-target health rollup shown on the status board.
    #[serde(default)]
    pub health: HealthConfig,
}

fn default_true() -> bool {
    true
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_alert_cooldown() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_escalation_threshold() -> u32 {
    3
}

fn default_dispatch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_startup_lookback() -> Duration {
    Duration::from_secs(86_400)
}

fn default_future_skew() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_retention() -> Duration {
    Duration::from_secs(7 * 86_400)
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval: default_tick_interval(),
            alert_cooldown: default_alert_cooldown(),
            escalation_threshold: default_escalation_threshold(),
            dispatch_timeout: default_dispatch_timeout(),
            retry_backoff: default_retry_backoff(),
            drain_timeout: default_drain_timeout(),
            startup_lookback: default_startup_lookback(),
            future_skew: default_future_skew(),
            retention: default_retention(),
            heartbeat: true,
            ledger_path: None,
            health: HealthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Runs observed within this window feed the success rate.
    #[serde(default = "default_health_window", with = "serde_str")]
    pub window: Duration,

    /// Success rate (percent) below which a target is degraded.
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,

    /// A target whose last success is older than this is degraded.
    #[serde(default = "default_stale_after", with = "serde_str")]
    pub stale_after: Duration,
}

fn default_health_window() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_min_success_rate() -> f64 {
    80.0
}

fn default_stale_after() -> Duration {
    Duration::from_secs(25 * 3600)
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window: default_health_window(),
            min_success_rate: default_min_success_rate(),
            stale_after: default_stale_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// When off, incidents are still tracked but nothing is sent.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// Send a one-off notice when the monitor starts.
    #[serde(default = "default_true")]
    pub startup_notice: bool,

    /// Minijinja override for the alert subject.
    #[serde(default)]
    pub subject_template: Option<String>,

    /// Minijinja override for the alert body.
    #[serde(default)]
    pub body_template: Option<String>,
}

fn default_subject_prefix() -> String {
    "[Newsletter System Alert]".into()
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subject_prefix: default_subject_prefix(),
            startup_notice: true,
            subject_template: None,
            body_template: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    /// Defaults to 587; 465 switches to implicit TLS.
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub tls: Option<bool>,
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    /// Falls back to `SMTP_USERNAME`.
    #[serde(default, skip_serializing)]
    pub username: Option<String>,
    /// Falls back to `SMTP_PASSWORD`.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl EmailConfig {
    /// Resolve SMTP credentials, preferring the file over the environment.
    ///
    /// Returns `None` unless both halves are available, in which case the
    /// connection is unauthenticated.
    pub fn credentials(&self) -> Option<(String, String)> {
        let username = self
            .username
            .clone()
            .or_else(|| std::env::var("SMTP_USERNAME").ok())
            .filter(|s| !s.is_empty())?;
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var("SMTP_PASSWORD").ok())
            .filter(|s| !s.is_empty())?;
        Some((username, password))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusApiConfig {
    /// Base URL; `${VAR}` references are resolved from the environment.
    pub url: String,
    /// Sent as a bearer token when present.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_dispatch_timeout", with = "serde_str")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// One `[[targets]]` entry, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    /// UTC times of day, `HH:MM` or `HH:MM:SS`.
    pub times: Vec<String>,
    #[serde(default = "default_grace", with = "serde_str")]
    pub grace: Duration,
    /// Completions this long before an expected time count toward it.
    #[serde(default = "default_early", with = "serde_str")]
    pub early: Duration,
    /// Overrides `monitoring.escalation_threshold`.
    #[serde(default)]
    pub escalation_threshold: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_grace() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_early() -> Duration {
    Duration::from_secs(15 * 60)
}

/// The newsletter pipeline: a Worker four times a day and a Publisher once.
pub fn default_targets() -> Vec<TargetConfig> {
    vec![
        TargetConfig {
            name: "Worker".into(),
            times: vec!["06:00".into(), "12:00".into(), "18:00".into(), "00:00".into()],
            grace: Duration::from_secs(30 * 60),
            early: Duration::from_secs(15 * 60),
            escalation_threshold: None,
            description: Some("Newsletter content worker".into()),
        },
        TargetConfig {
            name: "Publisher".into(),
            times: vec!["08:00".into()],
            grace: Duration::from_secs(60 * 60),
            early: Duration::from_secs(30 * 60),
            escalation_threshold: None,
            description: Some("Daily newsletter publisher".into()),
        },
    ]
}
