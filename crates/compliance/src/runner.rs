//! Scheduler loop driving [`ComplianceEngine`] ticks.
//!
//! The loop sends the startup notice, then evaluates once per tick until the
//! shutdown channel flips to `true` (or its sender is dropped). A tick that is
//! in flight when shutdown arrives gets `drain_timeout` to finish before it is
//! abandoned.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock, Ticker};
use crate::engine::ComplianceEngine;

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExit {
    /// Ticks that ran to completion.
    pub ticks: u64,
    /// Whether an in-flight tick was dropped after the drain timeout.
    pub abandoned: bool,
}

pub struct SchedulerLoop {
    engine: ComplianceEngine,
    ticker: Box<dyn Ticker>,
    clock: Arc<dyn Clock>,
    drain_timeout: Duration,
}

impl SchedulerLoop {
    pub fn new(engine: ComplianceEngine, ticker: impl Ticker + 'static) -> Self {
        Self {
            engine,
            ticker: Box::new(ticker),
            clock: Arc::new(SystemClock),
            drain_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the maximum time an in-flight tick may take after shutdown (default: 10s).
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Run until shutdown is requested or the ticker is exhausted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> LoopExit {
        let mut ticks = 0u64;

        info!("scheduler loop starting");
        self.engine.startup(self.clock.now()).await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    info!(ticks, "scheduler loop stopped");
                    return LoopExit { ticks, abandoned: false };
                }
                more = self.ticker.tick() => {
                    if !more {
                        info!(ticks, "ticker exhausted, scheduler loop stopped");
                        return LoopExit { ticks, abandoned: false };
                    }
                }
            }

            let now = self.clock.now();
            let tick = self.engine.tick(now);
            tokio::pin!(tick);

            tokio::select! {
                _ = &mut tick => {
                    ticks += 1;
                }
                _ = shutdown_requested(&mut shutdown) => {
                    info!(timeout = ?self.drain_timeout, "shutdown during tick, draining");
                    return match tokio::time::timeout(self.drain_timeout, &mut tick).await {
                        Ok(_) => {
                            ticks += 1;
                            info!(ticks, "in-flight tick drained, scheduler loop stopped");
                            LoopExit { ticks, abandoned: false }
                        }
                        Err(_) => {
                            warn!(ticks, "in-flight tick timed out, abandoning");
                            LoopExit { ticks, abandoned: true }
                        }
                    };
                }
            }
        }
    }
}

/// Resolves once `true` is published or the sender goes away.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
