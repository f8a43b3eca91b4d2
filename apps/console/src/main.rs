//! Sentinel Console - headless runner for the live alert stream controller.
//!
//! Connects to the alert source, keeps the in-memory views, rings the alarm,
//! and exposes state and operator commands over a small HTTP API.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sentinel_core::{
    start_server, AlarmPlayer, AlertController, AppState, CommandAlarmPlayer, LoggingAlarmPlayer,
    LoggingEventEmitter,
};
use tokio::signal;
use tokio::sync::oneshot;

use crate::config::ConsoleConfig;

/// Sentinel Console - headless security alert stream client.
#[derive(Parser, Debug)]
#[command(name = "sentinel-console")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SENTINEL_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Alert source URL, e.g. ws://localhost:8000/ws/alerts (overrides config file).
    #[arg(short, long)]
    endpoint: Option<String>,

    /// HTTP API port (overrides config file).
    #[arg(short = 'p', long)]
    http_port: Option<u16>,

    /// Start with the alarm muted.
    #[arg(long)]
    mute: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Sentinel Console v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ConsoleConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if args.mute {
        config.sound_enabled = false;
    }

    let core_config = config
        .to_core_config()
        .context("Invalid alert source endpoint")?;

    let player: Arc<dyn AlarmPlayer> = match CommandAlarmPlayer::from_argv(&config.alarm_command) {
        Some(player) => {
            log::info!("Alarm command: {:?}", config.alarm_command);
            Arc::new(player)
        }
        None => {
            log::info!("No alarm command configured - alarms will only be logged");
            Arc::new(LoggingAlarmPlayer)
        }
    };

    let controller = Arc::new(
        AlertController::builder()
            .config(core_config)
            .alarm_player(player)
            .external_emitter(Arc::new(LoggingEventEmitter))
            .build()
            .context("Invalid controller configuration")?,
    );
    controller.start();

    // Serve the API until shutdown
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let app_state = AppState::new(Arc::clone(&controller));
    let http_port = config.http_port;
    let server_handle = tokio::spawn(async move {
        let shutdown = async {
            let _ = stop_rx.await;
        };
        if let Err(e) = start_server(app_state, http_port, shutdown).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    let _ = stop_tx.send(());
    controller.shutdown().await;
    if let Err(e) = server_handle.await {
        log::error!("Server task failed: {}", e);
    }

    let stats = controller.stats();
    log::info!(
        "Shutdown complete ({} alerts accepted, {} frames dropped)",
        stats.accepted_alerts,
        stats.dropped_frames
    );
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
