//! Monitor configuration.
//!
//! Parsed from `runwatch.toml`, with `.env` loading and `RUNWATCH_*`
//! environment overrides, then validated once before anything starts.
//! Immutable for the lifetime of the process.

mod loading;
mod types;
mod validation;


pub use loading::load_dotenv;
pub use types::{
    default_targets, AlertsConfig, EmailConfig, HealthConfig, MonitorConfig, MonitoringConfig, ServerConfig,
    StatusApiConfig, TargetConfig,
};
