//! Alert delivery for the compliance monitor.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - SMTP email and status-API channel implementations
//! - `StatusReporter` for per-target compliance updates and heartbeats
//! - Minijinja template rendering for alert subjects and bodies
//! - Dispatcher that fans an alert out to every channel with timeout and retry

pub mod dispatcher;
pub mod email;
pub mod status_api;
pub mod templating;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use email::EmailNotifier;
pub use status_api::StatusApiClient;
pub use templating::TemplateRenderer;
pub use traits::{
    DispatchError, DispatchResult, Notification, Notifier, NotifyError, StatusReporter,
    TargetStatus,
};
