//! Time sources and tick drivers for the scheduler loop.
//!
//! Production uses [`SystemClock`] and an [`IntervalTicker`]; tests swap in
//! [`ManualClock`] and [`ManualTicker`] to step through a day without
//! sleeping.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().expect("manual clock lock poisoned") = at;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut guard = self.now.lock().expect("manual clock lock poisoned");
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("manual clock lock poisoned")
    }
}

/// Source of loop wake-ups.
#[async_trait::async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. `false` means no more ticks will come.
    async fn tick(&mut self) -> bool;
}

/// Fixed-period ticker on `tokio::time::interval`. Fires immediately on the
/// first call; late ticks are delayed rather than bursted.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: tokio::time::Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait::async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticker driven from a [`TickHandle`].
///
/// Each tick carries an acknowledgement that completes when the loop asks
/// for the following tick, i.e. once the previous tick has been processed.
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<Option<oneshot::Sender<()>>>,
    pending: Option<oneshot::Sender<()>>,
}

#[derive(Clone)]
pub struct TickHandle {
    tx: mpsc::UnboundedSender<Option<oneshot::Sender<()>>>,
}

impl ManualTicker {
    pub fn new() -> (Self, TickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, pending: None }, TickHandle { tx })
    }
}

#[async_trait::async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        if let Some(ack) = self.pending.take() {
            let _ = ack.send(());
        }
        match self.rx.recv().await {
            Some(ack) => {
                self.pending = ack;
                true
            }
            None => false,
        }
    }
}

impl TickHandle {
    /// Fire one tick and wait until the loop has finished processing it.
    ///
    /// Returns `false` if the loop stopped before completing the tick.
    pub async fn tick(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Some(ack_tx)).is_err() {
            return false;
        }
        ack_rx.await.is_ok()
    }

    /// Fire one tick without waiting for it.
    pub fn trigger(&self) -> bool {
        self.tx.send(None).is_ok()
    }
}
