//! runwatch: schedule-compliance monitor for periodic batch processes.
//!
//! Loads the schedule, starts the evaluation loop, and serves the inbound
//! report API until SIGINT/SIGTERM.

mod api;
mod router;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use runwatch_compliance::{
    ComplianceEngine, EngineSettings, IntervalTicker, JsonLinesStore, RunLedger, ScheduleRegistry,
    SchedulerLoop, SystemClock,
};
use runwatch_core::config::load_dotenv;
use runwatch_core::MonitorConfig;
use runwatch_notify::{
    Dispatcher, EmailNotifier, Notifier, StatusApiClient, StatusReporter, TemplateRenderer,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Watches periodic jobs against their expected schedule and alerts on
/// missed or failed runs.
#[derive(Parser, Debug)]
#[command(name = "runwatch", version, about)]
struct Cli {
    /// Path to the monitor config file.
    #[arg(long, env = "RUNWATCH_CONFIG", default_value = "runwatch.toml")]
    config: PathBuf,

    /// Validate the config, print the resolved schedule and exit.
    #[arg(long)]
    check: bool,

    /// Send a test notification through every alert channel and exit.
    #[arg(long)]
    test_channels: bool,
}

// ── Wiring ──────────────────────────────────────────────────────────

fn build_ledger(config: &MonitorConfig, registry: Arc<ScheduleRegistry>) -> anyhow::Result<RunLedger> {
    let skew = TimeDelta::from_std(config.monitoring.future_skew)?;
    let ledger = match &config.monitoring.ledger_path {
        Some(path) => {
            info!(path = %path.display(), "using persistent run ledger");
            RunLedger::with_store(registry, Box::new(JsonLinesStore::open(path)?))?
        }
        None => RunLedger::new(registry),
    };
    Ok(ledger.with_future_skew(skew))
}

/// Alert channels plus the optional status backend.
fn build_channels(
    config: &MonitorConfig,
) -> anyhow::Result<(Vec<Box<dyn Notifier>>, Option<Arc<dyn StatusReporter>>)> {
    let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
    let mut reporter: Option<Arc<dyn StatusReporter>> = None;

    if let Some(email) = &config.email {
        channels.push(Box::new(EmailNotifier::from_config(email)?));
        info!(host = %email.smtp_host, recipients = email.to.len(), "email alerts enabled");
    }

    if let Some(status_api) = &config.status_api {
        let client = StatusApiClient::from_config(status_api)?;
        info!(url = %client.base_url(), "status API enabled");
        channels.push(Box::new(client.clone()));
        reporter = Some(Arc::new(client));
    }

    if channels.is_empty() {
        tracing::warn!("no alert channels configured, incidents will only be logged");
    }
    Ok((channels, reporter))
}

async fn test_channels(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let mut failed = 0;
    for (idx, name) in dispatcher.channel_names().iter().enumerate() {
        match dispatcher.test_channel(idx).await {
            Ok(()) => info!(channel = %name, "test notification sent"),
            Err(e) => {
                tracing::error!(channel = %name, error = %e, "test notification failed");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} channel(s) failed the test notification");
    }
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigint), Ok(mut sigterm)) =
            (signal(SignalKind::interrupt()), signal(SignalKind::terminate()))
        else {
            tracing::error!("failed to register signal handlers, falling back to ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = MonitorConfig::load(&cli.config)?;
    config.log_summary();

    if cli.check {
        println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
        return Ok(());
    }

    let registry = Arc::new(ScheduleRegistry::from_config(&config)?);
    let ledger = Arc::new(build_ledger(&config, registry)?);

    let (channels, reporter) = build_channels(&config)?;
    let dispatcher = Dispatcher::new(channels)
        .with_timeouts(config.monitoring.dispatch_timeout, config.monitoring.retry_backoff);
    info!(channels = ?dispatcher.channel_names(), "alert dispatcher ready");

    if cli.test_channels {
        return test_channels(&dispatcher).await;
    }

    let renderer = TemplateRenderer::with_templates(
        config.alerts.subject_prefix.clone(),
        config.alerts.subject_template.clone(),
        config.alerts.body_template.clone(),
    )?;

    let mut engine = ComplianceEngine::new(
        Arc::clone(&ledger),
        dispatcher,
        EngineSettings::from_config(&config),
        Utc::now(),
    )
    .with_renderer(renderer);
    if let Some(reporter) = reporter {
        engine = engine.with_reporter(reporter);
    }

    let state = Arc::new(state::AppState {
        engine: engine.handle(),
        clock: Arc::new(SystemClock),
        config_summary: config.redacted_summary(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = SchedulerLoop::new(engine, IntervalTicker::new(config.monitoring.tick_interval))
        .with_drain_timeout(config.monitoring.drain_timeout);
    let loop_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "report API listening");

    let mut server_shutdown = shutdown_rx;
    let server = axum::serve(listener, router::build_router(state)).with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });
    let server_task = tokio::spawn(async move { server.await });

    os_signal().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let exit = loop_task.await?;
    if exit.abandoned {
        tracing::warn!(ticks = exit.ticks, "scheduler stopped with an abandoned tick");
    }
    server_task.await??;

    info!(ticks = exit.ticks, "runwatch exited cleanly");
    Ok(())
}
