//! The compliance engine: one tick of evaluate -> deduplicate -> notify.
//!
//! The engine is constructed explicitly and owned by the scheduler loop.
//! Everything the HTTP surface needs to read (ledger, activity, metrics,
//! status board) is shared through an [`EngineHandle`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use runwatch_core::{Alert, AlertEvent, ComplianceState, MonitorConfig, SlotKey, Target};
use runwatch_notify::{
    DispatchResult, Dispatcher, Notification, StatusReporter, TargetStatus, TemplateRenderer,
};
use serde::Serialize;

use crate::activity::{ActivityKind, ActivityLevel, ActivityLog};
use crate::dedup::{AlertDeduplicator, Decision, SuppressionEntry};
use crate::evaluator::{ComplianceEvaluator, Evaluation};
use crate::health::{HealthPolicy, TargetHealth};
use crate::ledger::RunLedger;
use crate::metrics::EngineMetrics;
use crate::registry::ScheduleRegistry;

// ── Settings ────────────────────────────────────────────────────────

/// Engine switches and timings taken from [`MonitorConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub monitoring_enabled: bool,
    pub alerts_enabled: bool,
    pub startup_notice: bool,
    pub heartbeat: bool,
    pub alert_cooldown: Duration,
    pub retention: Duration,
    pub startup_lookback: Duration,
    pub health: HealthPolicy,
}

impl EngineSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            monitoring_enabled: config.monitoring.enabled,
            alerts_enabled: config.alerts.enabled,
            startup_notice: config.alerts.startup_notice,
            heartbeat: config.monitoring.heartbeat,
            alert_cooldown: config.monitoring.alert_cooldown,
            retention: config.monitoring.retention,
            startup_lookback: config.monitoring.startup_lookback,
            health: HealthPolicy::from_config(&config.monitoring.health),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

// ── Shared read-side state ──────────────────────────────────────────

/// Last classification of one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetView {
    pub target: String,
    pub schedule: String,
    pub slot: Option<SlotKey>,
    pub state: Option<ComplianceState>,
    pub evaluated_at: Option<DateTime<Utc>>,
    /// Rolling health from the ledger, refreshed every tick.
    pub health: Option<TargetHealth>,
}

/// What the engine saw on its most recent tick.
#[derive(Debug, Clone, Serialize)]
pub struct StatusBoard {
    pub monitoring_enabled: bool,
    pub alerts_enabled: bool,
    pub watch_from: DateTime<Utc>,
    pub last_tick: Option<DateTime<Utc>>,
    pub targets: Vec<TargetView>,
    pub open_incidents: Vec<SuppressionEntry>,
}

/// Cloneable read access to engine state for the HTTP layer.
#[derive(Clone)]
pub struct EngineHandle {
    pub registry: Arc<ScheduleRegistry>,
    pub ledger: Arc<RunLedger>,
    pub activity: Arc<ActivityLog>,
    pub metrics: Arc<RwLock<EngineMetrics>>,
    pub status: Arc<RwLock<StatusBoard>>,
}

impl EngineHandle {
    pub fn metrics(&self) -> EngineMetrics {
        self.metrics.read().expect("engine metrics lock poisoned").clone()
    }

    pub fn status(&self) -> StatusBoard {
        self.status.read().expect("status board lock poisoned").clone()
    }
}

/// Counts for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub skipped: bool,
    pub evaluated: usize,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub dispatch_failures: usize,
    pub errors: usize,
}

/// Per-target work produced by the synchronous half of a tick.
struct Pending {
    target: Target,
    evaluation: Evaluation,
    alert: Option<Alert>,
}

struct Delivered {
    target: String,
    alert: Option<Alert>,
    results: Vec<DispatchResult>,
    status_error: Option<String>,
}

// ── Engine ──────────────────────────────────────────────────────────

pub struct ComplianceEngine {
    registry: Arc<ScheduleRegistry>,
    ledger: Arc<RunLedger>,
    evaluator: ComplianceEvaluator,
    dedup: AlertDeduplicator,
    dispatcher: Dispatcher,
    reporter: Option<Arc<dyn StatusReporter>>,
    renderer: TemplateRenderer,
    settings: EngineSettings,
    activity: Arc<ActivityLog>,
    metrics: Arc<RwLock<EngineMetrics>>,
    status: Arc<RwLock<StatusBoard>>,
}

impl ComplianceEngine {
    /// Build an engine that starts watching at `started_at` minus the
    /// configured startup lookback.
    pub fn new(
        ledger: Arc<RunLedger>,
        dispatcher: Dispatcher,
        settings: EngineSettings,
        started_at: DateTime<Utc>,
    ) -> Self {
        let registry = Arc::clone(ledger.registry());
        let watch_from = TimeDelta::from_std(settings.startup_lookback)
            .ok()
            .and_then(|lookback| started_at.checked_sub_signed(lookback))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let status = StatusBoard {
            monitoring_enabled: settings.monitoring_enabled,
            alerts_enabled: settings.alerts_enabled,
            watch_from,
            last_tick: None,
            targets: registry
                .targets()
                .iter()
                .map(|t| TargetView {
                    target: t.name.clone(),
                    schedule: t.schedule_label(),
                    slot: None,
                    state: None,
                    evaluated_at: None,
                    health: None,
                })
                .collect(),
            open_incidents: Vec::new(),
        };

        Self {
            registry,
            ledger,
            evaluator: ComplianceEvaluator::new(watch_from),
            dedup: AlertDeduplicator::new(settings.alert_cooldown),
            dispatcher,
            reporter: None,
            renderer: TemplateRenderer::default(),
            settings,
            activity: Arc::new(ActivityLog::new()),
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            status: Arc::new(RwLock::new(status)),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            registry: Arc::clone(&self.registry),
            ledger: Arc::clone(&self.ledger),
            activity: Arc::clone(&self.activity),
            metrics: Arc::clone(&self.metrics),
            status: Arc::clone(&self.status),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Send the one-off startup notice when enabled.
    pub async fn startup(&self, now: DateTime<Utc>) {
        if !self.settings.startup_notice || !self.settings.alerts_enabled {
            return;
        }
        if self.dispatcher.is_empty() {
            tracing::debug!("no alert channels, skipping startup notice");
            return;
        }
        let notice = self.renderer.startup_notice(self.registry.targets(), now);
        let failed = self
            .dispatcher
            .dispatch(&notice)
            .await
            .iter()
            .filter(|r| !r.success())
            .count();
        if failed > 0 {
            tracing::warn!(failed, "startup notice could not be delivered to every channel");
        } else {
            tracing::info!("startup notice sent");
        }
    }

    /// Run one evaluation tick at `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickSummary {
        let started = Instant::now();

        if !self.settings.monitoring_enabled {
            tracing::info!("monitoring disabled, skipping tick");
            self.metrics.write().expect("engine metrics lock poisoned").ticks_skipped += 1;
            return TickSummary {
                skipped: true,
                ..Default::default()
            };
        }

        if self.settings.heartbeat {
            if let Some(reporter) = &self.reporter {
                if let Err(e) = reporter.heartbeat(now).await {
                    tracing::warn!(error = %e, "monitor heartbeat failed");
                }
            }
        }

        let mut summary = TickSummary::default();
        let pending = self.classify(now, &mut summary);
        let delivered = self.deliver(&pending, now).await;
        self.record_delivery(delivered, now, &mut summary);

        self.publish_status(&pending, now);
        self.prune(now);

        self.metrics
            .write()
            .expect("engine metrics lock poisoned")
            .record_tick(now, started.elapsed());

        tracing::debug!(
            evaluated = summary.evaluated,
            alerts = summary.alerts_sent,
            suppressed = summary.alerts_suppressed,
            errors = summary.errors,
            "tick complete"
        );
        summary
    }

    /// Evaluate every target and run the deduplicator. Failures are isolated
    /// per target.
    fn classify(&mut self, now: DateTime<Utc>, summary: &mut TickSummary) -> Vec<Pending> {
        let snapshot = self.ledger.snapshot();
        let registry = Arc::clone(&self.registry);
        let mut pending = Vec::with_capacity(registry.len());

        for target in registry.targets() {
            let evaluation = match self.evaluator.evaluate(target, &snapshot, now) {
                Ok(Some(e)) => e,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(target_name = %target.name, error = %e, "evaluation failed");
                    self.activity.log(
                        &target.name,
                        now,
                        ActivityLevel::Error,
                        ActivityKind::EvaluationError,
                        e.to_string(),
                    );
                    self.metrics.write().expect("engine metrics lock poisoned").evaluation_errors += 1;
                    summary.errors += 1;
                    continue;
                }
            };
            summary.evaluated += 1;
            self.metrics
                .write()
                .expect("engine metrics lock poisoned")
                .record_state(evaluation.state);
            self.activity.log(
                &target.name,
                now,
                ActivityLevel::Debug,
                ActivityKind::Evaluation,
                format!("{} classified {}", evaluation.slot, evaluation.state),
            );

            let (decision, alert) = self.dedup.observe(target, &evaluation, now);
            if decision == Decision::Suppressed {
                summary.alerts_suppressed += 1;
                self.metrics.write().expect("engine metrics lock poisoned").alerts_suppressed += 1;
                self.activity.log(
                    &target.name,
                    now,
                    ActivityLevel::Debug,
                    ActivityKind::Suppressed,
                    format!("{} still {}, alert suppressed", evaluation.slot, evaluation.state),
                );
            }

            pending.push(Pending {
                target: target.clone(),
                evaluation,
                alert,
            });
        }

        pending
    }

    /// Send alerts and status reports for all targets concurrently.
    async fn deliver(&self, pending: &[Pending], now: DateTime<Utc>) -> Vec<Delivered> {
        let work = pending.iter().map(|p| async move {
            let status_error = match &self.reporter {
                Some(reporter) => {
                    let status = TargetStatus {
                        target: p.target.name.clone(),
                        state: p.evaluation.state,
                        slot: p.evaluation.slot.clone(),
                        evaluated_at: now,
                    };
                    reporter.report_status(&status).await.err().map(|e| e.to_string())
                }
                None => None,
            };

            let results = match &p.alert {
                Some(alert) if self.settings.alerts_enabled => {
                    let notification = self.render(alert, &p.target, now);
                    self.dispatcher.dispatch(&notification).await
                }
                _ => Vec::new(),
            };

            Delivered {
                target: p.target.name.clone(),
                alert: p.alert.clone(),
                results,
                status_error,
            }
        });
        join_all(work).await
    }

    fn render(&self, alert: &Alert, target: &Target, now: DateTime<Utc>) -> Notification {
        match self.renderer.render_alert(alert, target, now) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(target_name = %target.name, error = %e, "alert template failed, sending plain text");
                Notification {
                    subject: format!("{} {}", self.renderer.prefix(), alert.title()),
                    body: alert.message.clone(),
                    metadata: Notification::alert_metadata(alert),
                }
            }
        }
    }

    fn record_delivery(&self, delivered: Vec<Delivered>, now: DateTime<Utc>, summary: &mut TickSummary) {
        let mut metrics = self.metrics.write().expect("engine metrics lock poisoned");

        for d in delivered {
            if let Some(err) = d.status_error {
                tracing::warn!(target_name = %d.target, error = %err, "status report failed");
                metrics.status_report_failures += 1;
                self.activity.log(&d.target, now, ActivityLevel::Warning, ActivityKind::StatusReport, err);
            }

            let Some(alert) = d.alert else { continue };

            if !self.settings.alerts_enabled {
                tracing::info!(target_name = %d.target, alert = %alert.title(), "alert dispatch disabled, not sending");
                metrics.alerts_withheld += 1;
                self.activity.log(
                    &d.target,
                    now,
                    ActivityLevel::Info,
                    activity_kind(&alert),
                    format!("{} (dispatch disabled)", alert.title()),
                );
                continue;
            }

            let failures: Vec<_> = d.results.iter().filter_map(|r| r.error.as_ref()).collect();
            let delivered_to = d.results.len() - failures.len();
            summary.dispatch_failures += failures.len();
            metrics.dispatch_failures += failures.len() as u64;

            if delivered_to > 0 || d.results.is_empty() {
                summary.alerts_sent += 1;
                metrics.alerts_sent += 1;
            }

            tracing::info!(
                target_name = %d.target,
                severity = %alert.severity,
                event = %alert.event,
                channels = d.results.len(),
                failed = failures.len(),
                "{}",
                alert.title()
            );
            self.activity.log_with_details(
                &d.target,
                now,
                alert_level(&alert),
                activity_kind(&alert),
                alert.message.clone(),
                Some(serde_json::json!({
                    "severity": alert.severity,
                    "slot": alert.slot.to_string(),
                    "channels": d.results.iter().map(|r| &r.channel).collect::<Vec<_>>(),
                })),
            );
            for err in failures {
                self.activity.log(&d.target, now, ActivityLevel::Error, ActivityKind::DispatchError, err.to_string());
            }
        }
    }

    fn publish_status(&self, pending: &[Pending], now: DateTime<Utc>) {
        let latest: HashMap<&str, &Evaluation> = pending
            .iter()
            .map(|p| (p.target.name.as_str(), &p.evaluation))
            .collect();

        let mut board = self.status.write().expect("status board lock poisoned");
        board.last_tick = Some(now);
        for view in &mut board.targets {
            if let Some(e) = latest.get(view.target.as_str()) {
                view.slot = Some(e.slot.clone());
                view.state = Some(e.state);
                view.evaluated_at = Some(e.evaluated_at);
            }
            let records = self.ledger.records_for(&view.target);
            view.health = Some(self.settings.health.assess(&records, view.state, now));
        }
        board.open_incidents = self.dedup.open_incidents();
    }

    fn prune(&self, now: DateTime<Utc>) {
        let Ok(retention) = TimeDelta::from_std(self.settings.retention) else {
            return;
        };
        if let Some(cutoff) = now.checked_sub_signed(retention) {
            self.ledger.prune_before(cutoff.date_naive());
        }
    }
}

fn activity_kind(alert: &Alert) -> ActivityKind {
    match alert.event {
        AlertEvent::Trigger => ActivityKind::Alert,
        AlertEvent::Resolve => ActivityKind::Resolve,
    }
}

fn alert_level(alert: &Alert) -> ActivityLevel {
    match alert.event {
        AlertEvent::Trigger => ActivityLevel::Warning,
        AlertEvent::Resolve => ActivityLevel::Info,
    }
}
