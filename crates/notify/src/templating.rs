//! Minijinja template rendering for alert messages.
//!
//! Subject and body templates can be overridden from config; the defaults
//! reproduce the plain-text alert mail of the newsletter monitoring service.
//! Templates are validated once when the renderer is built, then rendered
//! per alert with a fresh [`minijinja::Environment`].

use chrono::{DateTime, Utc};
use runwatch_core::{Alert, Target};

use crate::traits::{Notification, NotifyError};

pub const DEFAULT_SUBJECT_TEMPLATE: &str = "{{ prefix }} {{ alert.title }}";

pub const DEFAULT_BODY_TEMPLATE: &str = "\
Newsletter System Alert

Service: {{ target.name }}
Time: {{ now }} UTC
Issue: {{ alert.title }}
Severity: {{ alert.severity | upper }}

Details:
{{ alert.message }}

Expected at: {{ alert.expected_at }} (grace {{ target.grace_minutes }}m)
Schedule: {{ target.schedule }}
{% if target.description %}Description: {{ target.description }}
{% endif %}
---
runwatch schedule compliance monitor
";

/// Context data available to alert templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    pub target: TargetContext,
    pub alert: AlertContext,
    pub prefix: String,
    /// Render time in ISO 8601 format.
    pub now: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TargetContext {
    pub name: String,
    pub description: Option<String>,
    /// Expected times joined for display, e.g. `"00:00, 06:00"`.
    pub schedule: String,
    pub grace_minutes: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertContext {
    pub title: String,
    /// `"missed"` or `"failed"`.
    pub kind: String,
    /// `"trigger"` or `"resolve"`.
    pub event: String,
    pub severity: String,
    pub message: String,
    pub slot: String,
    pub expected_at: String,
}

impl TemplateContext {
    pub fn new(alert: &Alert, target: &Target, prefix: &str, now: DateTime<Utc>) -> Self {
        Self {
            target: TargetContext {
                name: target.name.clone(),
                description: target.description.clone(),
                schedule: target.schedule_label(),
                grace_minutes: target.grace.num_minutes(),
            },
            alert: AlertContext {
                title: alert.title(),
                kind: alert.kind.to_string(),
                event: alert.event.to_string(),
                severity: alert.severity.to_string(),
                message: alert.message.clone(),
                slot: alert.slot.to_string(),
                expected_at: alert.slot.expected_at().format("%Y-%m-%d %H:%M").to_string(),
            },
            prefix: prefix.to_string(),
            now: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }
}

/// Renders alert subjects and bodies.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    prefix: String,
    subject_template: String,
    body_template: String,
}

impl TemplateRenderer {
    /// Renderer with the built-in templates.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            subject_template: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            body_template: DEFAULT_BODY_TEMPLATE.to_string(),
        }
    }

    /// Renderer with optional overrides. Invalid templates are rejected here
    /// so a bad config fails at startup rather than on the first alert.
    pub fn with_templates(
        prefix: impl Into<String>,
        subject_template: Option<String>,
        body_template: Option<String>,
    ) -> Result<Self, NotifyError> {
        let mut renderer = Self::new(prefix);
        if let Some(tmpl) = subject_template {
            Self::validate(&tmpl)
                .map_err(|e| NotifyError::Config(format!("invalid subject template: {e}")))?;
            renderer.subject_template = tmpl;
        }
        if let Some(tmpl) = body_template {
            Self::validate(&tmpl)
                .map_err(|e| NotifyError::Config(format!("invalid body template: {e}")))?;
            renderer.body_template = tmpl;
        }
        Ok(renderer)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Minijinja environment with the builtin filters; `title` also splits
    /// on underscores so state names like `on_time` read as words.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("title", title_filter);
        env
    }

    /// Render a template string with the given context.
    pub fn render(&self, template_str: &str, ctx: &TemplateContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check template syntax without evaluating it.
    pub fn validate(template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }

    /// Render an alert into a deliverable [`Notification`].
    pub fn render_alert(
        &self,
        alert: &Alert,
        target: &Target,
        now: DateTime<Utc>,
    ) -> Result<Notification, NotifyError> {
        let ctx = TemplateContext::new(alert, target, &self.prefix, now);
        let subject = self.render(&self.subject_template, &ctx)?.trim().to_string();
        let body = self.render(&self.body_template, &ctx)?;
        Ok(Notification {
            subject,
            body,
            metadata: Notification::alert_metadata(alert),
        })
    }

    /// One-off notice sent when the monitor comes up.
    pub fn startup_notice(&self, targets: &[Target], now: DateTime<Utc>) -> Notification {
        let mut body = format!(
            "Schedule monitor started at {} UTC.\n\nWatching {} target(s):\n",
            now.format("%Y-%m-%dT%H:%M:%S"),
            targets.len()
        );
        for t in targets {
            body.push_str(&format!(
                "- {} at [{}] UTC, grace {}m\n",
                t.name,
                t.schedule_label(),
                t.grace.num_minutes()
            ));
        }
        Notification {
            subject: format!("{} Monitoring service started", self.prefix),
            body,
            metadata: [("event".to_string(), "startup".to_string())].into(),
        }
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new("[Newsletter System Alert]")
    }
}

/// Capitalize the first letter of each underscore/space separated word.
fn title_filter(value: String) -> String {
    value
        .split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
