//! Location tracker - replays location fixes through the tracking core
//!
//! Wires a replay fix source, the burst relay, the tracking engine and the
//! tracking service, then prints every published state as a JSON line.
//!
//! Module structure:
//! - `domain/` - Core types (RawLocationFix, LocationEvent, LocationState)
//! - `io/` - Fix source contracts, relay buffer, replay provider
//! - `services/` - Reducer, TrackingEngine, TrackingService
//! - `infra/` - Config, Metrics, Clock/id injection

use anyhow::Context;
use clap::Parser;
use location_tracker::domain::types::epoch_ms;
use location_tracker::domain::TrackingStatus;
use location_tracker::infra::{Config, Metrics, SystemClock, UuidV7Generator};
use location_tracker::io::{create_fix_relay, load_fixes, synthetic_route, ReplayFixSource};
use location_tracker::services::{LocationPublisher, TrackingEngine, TrackingService};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Location tracker - classify and publish a stream of location fixes
#[derive(Parser, Debug)]
#[command(name = "location-tracker", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON Lines file of fixes to replay (overrides config)
    #[arg(short, long)]
    fixes: Option<String>,

    /// Interval between replayed fixes in milliseconds (overrides config)
    #[arg(short, long)]
    interval_ms: Option<u64>,
}

/// Length of the synthetic route used when no fixes file is given
const SYNTHETIC_ROUTE_LEN: usize = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| Config::resolve_config_path(&std::env::args().collect::<Vec<_>>()));
    let (config, config_error) = match Config::from_file(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "location_tracker_starting"
    );
    if let Some(e) = config_error {
        warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
    }

    let mut config = config;
    if let Some(path) = args.fixes {
        config = config.with_replay_file(path);
    }
    if let Some(ms) = args.interval_ms {
        config = config.with_update_interval_ms(ms);
    }

    info!(
        config_file = %config.config_file(),
        replay_file = config.replay_file().unwrap_or("synthetic"),
        update_interval_ms = %config.update_interval_ms(),
        min_update_interval_ms = %config.min_update_interval_ms(),
        max_update_delay_ms = %config.max_update_delay_ms(),
        relay_capacity = %config.relay_capacity(),
        policy = ?config.classification(),
        "config_loaded"
    );

    let clock = Arc::new(SystemClock);
    let metrics = Arc::new(Metrics::new());
    let engine = Arc::new(TrackingEngine::from_config(
        &config,
        clock.clone(),
        Arc::new(UuidV7Generator),
        metrics.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Relay between the provider and the engine
    let (relay, relay_worker) =
        create_fix_relay(config.relay_capacity(), engine.clone(), metrics.clone());
    let relay_handle = tokio::spawn(relay_worker.run(shutdown_rx.clone()));

    let fixes = match config.replay_file() {
        Some(path) => load_fixes(path).context("loading replay fixes")?,
        None => synthetic_route(
            (27.7172, 85.3240),
            SYNTHETIC_ROUTE_LEN,
            epoch_ms(),
            config.update_interval_ms(),
        ),
    };
    let source = Arc::new(ReplayFixSource::new(
        fixes,
        Duration::from_millis(config.update_interval_ms()),
        Arc::new(relay),
        clock,
    )
    .with_update_limits(
        Duration::from_millis(config.min_update_interval_ms()),
        Duration::from_millis(config.max_update_delay_ms()),
    ));
    let mut completions = source.completions();

    let has_permission = config.has_permission();
    let service = TrackingService::new(engine.clone(), source.clone(), move || has_permission);

    // Print every published state as a JSON line
    let mut printer_sub = service.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(state) = printer_sub.next().await {
            match serde_json::to_string(state.as_ref()) {
                Ok(line) => {
                    let mut stdout = std::io::stdout().lock();
                    let _ = writeln!(stdout, "{}", line);
                }
                Err(e) => warn!(error = %e, "state_serialize_failed"),
            }
            if state.status == TrackingStatus::Stopped {
                break;
            }
        }
    });

    // Periodic metrics report
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let reporter_metrics = metrics.clone();
        let mut reporter_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => reporter_metrics.report().log(),
                    _ = reporter_shutdown.changed() => break,
                }
            }
        });
    }

    service.start_tracking();

    // Run until the replay ends, the provider fails, or Ctrl+C
    let mut status_sub = service.subscribe();
    tokio::select! {
        _ = completions.changed() => info!("replay_complete"),
        _ = tokio::signal::ctrl_c() => info!("shutdown_signal_received"),
        _ = async {
            while let Some(state) = status_sub.next().await {
                if state.status == TrackingStatus::Error {
                    warn!(error = state.last_error.as_deref().unwrap_or("-"), "tracking_error");
                    break;
                }
            }
        } => {}
    }

    // Let the relay hand over what it still holds before stopping
    let _ = shutdown_tx.send(true);
    let _ = relay_handle.await;
    service.stop_tracking();

    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        warn!("state_printer_timeout");
    }

    metrics.report().log();
    info!("location-tracker shutdown complete");
    Ok(())
}
