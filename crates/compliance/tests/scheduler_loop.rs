//! Scheduler loop lifecycle with a manual ticker and clock.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use common::*;
use runwatch_compliance::{EngineSettings, ManualClock, ManualTicker, SchedulerLoop};
use tokio::sync::watch;

#[tokio::test]
async fn runs_ticks_until_shutdown() {
    let ledger = ledger();
    let recorder = Recorder::default();
    let settings = EngineSettings {
        startup_notice: true,
        ..settings()
    };
    let engine = engine(&ledger, vec![Box::new(recorder.clone())], settings, at(5, 50));
    let handle = engine.handle();

    let clock = Arc::new(ManualClock::new(at(5, 50)));
    let (ticker, ticks) = ManualTicker::new();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(SchedulerLoop::new(engine, ticker).with_clock(clock.clone()).run(stop_rx));

    clock.set(at(6, 10));
    assert!(ticks.tick().await);
    clock.advance(TimeDelta::minutes(25));
    assert!(ticks.tick().await);

    stop_tx.send(true).unwrap();
    let exit = task.await.unwrap();

    assert_eq!(exit.ticks, 2);
    assert!(!exit.abandoned);
    assert_eq!(recorder.events(), vec!["startup", "trigger"]);
    assert_eq!(handle.status().last_tick, Some(at(6, 35)));
}

#[tokio::test]
async fn dropped_sender_stops_the_loop() {
    let ledger = ledger();
    let engine = engine(&ledger, Vec::new(), settings(), at(5, 50));
    let (ticker, _ticks) = ManualTicker::new();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(SchedulerLoop::new(engine, ticker).run(stop_rx));

    drop(stop_tx);
    let exit = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop did not stop")
        .unwrap();
    assert_eq!(exit.ticks, 0);
}

#[tokio::test]
async fn in_flight_tick_is_drained() {
    let ledger = ledger();
    let slow = Slow::new(Duration::from_millis(100));
    let engine = engine(&ledger, vec![Box::new(slow.clone())], settings(), at(5, 50));

    let clock = Arc::new(ManualClock::new(at(6, 35)));
    let (ticker, ticks) = ManualTicker::new();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(
        SchedulerLoop::new(engine, ticker)
            .with_clock(clock)
            .with_drain_timeout(Duration::from_secs(5))
            .run(stop_rx),
    );

    assert!(ticks.trigger());
    slow.started.notified().await;
    stop_tx.send(true).unwrap();

    let exit = task.await.unwrap();
    assert_eq!(exit.ticks, 1);
    assert!(!exit.abandoned);
    assert_eq!(slow.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stuck_tick_is_abandoned_after_drain_timeout() {
    let ledger = ledger();
    let slow = Slow::new(Duration::from_secs(3));
    let engine = engine(&ledger, vec![Box::new(slow.clone())], settings(), at(5, 50));

    let clock = Arc::new(ManualClock::new(at(6, 35)));
    let (ticker, ticks) = ManualTicker::new();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(
        SchedulerLoop::new(engine, ticker)
            .with_clock(clock)
            .with_drain_timeout(Duration::from_millis(50))
            .run(stop_rx),
    );

    assert!(ticks.trigger());
    slow.started.notified().await;
    stop_tx.send(true).unwrap();

    let exit = task.await.unwrap();
    assert_eq!(exit.ticks, 0);
    assert!(exit.abandoned);
    assert_eq!(slow.finished.load(Ordering::SeqCst), 0);
}
