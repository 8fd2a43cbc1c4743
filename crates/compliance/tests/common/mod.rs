//! Shared fixtures: a newsletter registry, recording channels and reporters.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use runwatch_compliance::{ComplianceEngine, EngineSettings, RunLedger, ScheduleRegistry};
use runwatch_core::{MonitorConfig, Outcome, RunReport};
use runwatch_notify::{Dispatcher, Notification, Notifier, NotifyError, StatusReporter, TargetStatus};
use tokio::sync::Notify;

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

pub fn ledger() -> Arc<RunLedger> {
    let registry = ScheduleRegistry::from_config(&MonitorConfig::default()).unwrap();
    Arc::new(RunLedger::new(Arc::new(registry)))
}

pub fn report(target: &str, outcome: Outcome, timestamp: DateTime<Utc>) -> RunReport {
    RunReport {
        target: target.into(),
        outcome,
        timestamp: timestamp.to_rfc3339(),
        message: None,
    }
}

/// Scenarios watch only slots from their start time onward.
pub fn settings() -> EngineSettings {
    EngineSettings {
        startup_notice: false,
        startup_lookback: Duration::ZERO,
        ..EngineSettings::default()
    }
}

pub fn engine(
    ledger: &Arc<RunLedger>,
    channels: Vec<Box<dyn Notifier>>,
    settings: EngineSettings,
    started_at: DateTime<Utc>,
) -> ComplianceEngine {
    let dispatcher =
        Dispatcher::new(channels).with_timeouts(Duration::from_secs(5), Duration::from_millis(1));
    ComplianceEngine::new(Arc::clone(ledger), dispatcher, settings, started_at)
}

/// Channel that keeps every notification it receives.
#[derive(Clone, Default)]
pub struct Recorder {
    pub sent: Arc<Mutex<Vec<Notification>>>,
}

impl Recorder {
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.subject.clone()).collect()
    }

    pub fn severities(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| n.metadata.get("severity").cloned())
            .collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| n.metadata.get("event").cloned())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Notifier for Recorder {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recorder"
    }
}

/// Channel that always fails.
#[derive(Clone, Default)]
pub struct Broken {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Notifier for Broken {
    async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Smtp("connection refused".into()))
    }

    fn channel_name(&self) -> &str {
        "broken"
    }
}

/// Channel that signals when a send starts, then sleeps.
#[derive(Clone)]
pub struct Slow {
    pub delay: Duration,
    pub started: Arc<Notify>,
    pub finished: Arc<AtomicUsize>,
}

impl Slow {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Arc::new(Notify::new()),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for Slow {
    async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "slow"
    }
}

/// Status backend that records updates and can be told to fail.
#[derive(Default)]
pub struct MockReporter {
    pub updates: Mutex<Vec<TargetStatus>>,
    pub heartbeats: AtomicUsize,
    pub fail: bool,
}

#[async_trait::async_trait]
impl StatusReporter for MockReporter {
    async fn report_status(&self, status: &TargetStatus) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.updates.lock().unwrap().push(status.clone());
        Ok(())
    }

    async fn heartbeat(&self, _at: DateTime<Utc>) -> Result<(), NotifyError> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
