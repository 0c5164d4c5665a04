//! Firewatch - telemetry normalization and alert derivation
//!
//! Polls a loosely-specified upstream telemetry feed, normalizes it into
//! a stable internal model, and derives safety alerts on a fixed cadence.
//!
//! Module structure:
//! - `domain/` - Core types (Firefighter, Beacon, Alert, planar geometry)
//! - `io/` - External interfaces (upstream HTTP, Prometheus, blackbox)
//! - `services/` - Engine logic (normalize, store, rules, poller)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use firewatch::infra::{Config, Metrics};
use firewatch::io::{Blackbox, HttpTelemetrySource};
use firewatch::services::{Poller, TelemetryStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Firewatch - firefighter telemetry monitoring engine
#[derive(Parser, Debug)]
#[command(name = "firewatch", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full cycle visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = env!("GIT_HASH"), "firewatch starting");

    // Parse command line arguments using clap
    let args = Args::parse();

    // Load configuration from TOML file
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        upstream_url = %config.upstream_url(),
        upstream_timeout_ms = %config.upstream_timeout_ms(),
        poll_interval_ms = %config.poll_interval_ms(),
        dedup_window_secs = %config.dedup_window_secs(),
        retention_cap = %config.retention_cap(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let store = Arc::new(TelemetryStore::new(&config));
    let metrics = Arc::new(Metrics::new());

    let source = HttpTelemetrySource::new(
        config.upstream_url(),
        Duration::from_millis(config.upstream_timeout_ms()),
    )?;

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_store = store.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = firewatch::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_store,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let reporter_store = store.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let counts = reporter_store.counts();
            let summary = metrics_clone.report(counts.firefighters, counts.beacons_online);
            summary.log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the poller - drives the engine until shutdown
    let poller = Poller::new(source, store.clone(), &config, metrics);
    poller.run(shutdown_rx).await;

    // Post-incident snapshot, when configured
    if let Some(path) = config.blackbox_file() {
        let blackbox = Blackbox::new(path, config.site_id());
        if let Err(e) = blackbox.export(&store) {
            error!(error = %e, "blackbox_export_failed");
        }
    }

    info!("firewatch shutdown complete");
    Ok(())
}
