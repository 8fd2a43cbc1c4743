//! HTTP client for the external monitoring backend.
//!
//! Pushes per-target compliance updates and a monitor heartbeat, and doubles
//! as an alert channel. All calls are JSON POSTs under
//! `{base}/api/v1/monitoring/`, with a bearer token when an API key is set.

use chrono::{DateTime, SecondsFormat, Utc};
use runwatch_core::config::StatusApiConfig;
use serde::Serialize;

use crate::traits::{Notification, Notifier, NotifyError, StatusReporter, TargetStatus};

const UPDATE_PATH: &str = "/api/v1/monitoring/update";
const HEARTBEAT_PATH: &str = "/api/v1/monitoring/heartbeat";
const ALERTS_PATH: &str = "/api/v1/monitoring/alerts";

/// Client for the status backend.
///
/// `${VAR_NAME}` references in the URL and API key are resolved once at
/// construction. Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct StatusApiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct StatusUpdate<'a> {
    process_type: String,
    status: String,
    timestamp: String,
    slot: String,
    target: &'a str,
}

#[derive(Debug, Serialize)]
struct Heartbeat {
    service: &'static str,
    status: &'static str,
    timestamp: String,
    version: &'static str,
}

impl StatusApiClient {
    pub fn from_config(config: &StatusApiConfig) -> Result<Self, NotifyError> {
        let base_url = resolve_env_vars(&config.url)?.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(NotifyError::Config("status API url is empty".into()));
        }
        let api_key = config
            .api_key
            .as_deref()
            .map(resolve_env_vars)
            .transpose()?
            .filter(|k| !k.is_empty());

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), NotifyError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(%url, %status, body = %body_text, "status API returned non-2xx status");
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: body_text,
            });
        }

        tracing::debug!(%url, %status, "status API call succeeded");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for StatusApiClient {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.post(ALERTS_PATH, notification).await
    }

    fn channel_name(&self) -> &str {
        "status_api"
    }
}

#[async_trait::async_trait]
impl StatusReporter for StatusApiClient {
    async fn report_status(&self, status: &TargetStatus) -> Result<(), NotifyError> {
        let update = StatusUpdate {
            process_type: status.target.to_lowercase(),
            status: status.state.to_string(),
            timestamp: status.evaluated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            slot: status.slot.to_string(),
            target: &status.target,
        };
        self.post(UPDATE_PATH, &update).await
    }

    async fn heartbeat(&self, at: DateTime<Utc>) -> Result<(), NotifyError> {
        let beat = Heartbeat {
            service: "monitoring",
            status: "active",
            timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            version: env!("CARGO_PKG_VERSION"),
        };
        self.post(HEARTBEAT_PATH, &beat).await
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
///
/// Returns an error if a referenced variable is not set.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(NotifyError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name)
                .map_err(|_| NotifyError::Config(format!("env var not found: {var_name}")))?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}
