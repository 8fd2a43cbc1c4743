use thiserror::Error;

/// Problems with the schedule definition or monitor settings.
///
/// Always fatal: the monitor refuses to start rather than run with a schedule
/// it cannot interpret.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("target '{target}': {reason}")]
    Target { target: String, reason: String },

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn target(target: &str, reason: impl Into<String>) -> Self {
        ConfigError::Target {
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

/// A run report that was rejected at ingestion. Never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error("target '{target}' has no expected run at {time}")]
    UnknownSlot { target: String, time: String },

    #[error("malformed timestamp '{value}': {reason}")]
    MalformedTimestamp { value: String, reason: String },

    #[error("timestamp {timestamp} is ahead of the monitor clock ({now})")]
    FutureTimestamp { timestamp: String, now: String },
}
