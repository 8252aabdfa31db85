//! # safetrail
//!
//! Server binary: loads settings, wires the zone source, installs logging
//! and metrics, then serves until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use safetrail_core::logging::init_subscriber;
use safetrail_geofence::{JsonFileZoneSource, StaticZoneSource, ZoneSource};
use safetrail_server::SafetrailServer;
use safetrail_settings::{SafetrailSettings, load_settings_from_path, settings_path};
use tracing::{info, warn};

/// Real-time panic and geofence alerting server.
#[derive(Parser, Debug)]
#[command(name = "safetrail", about = "Real-time panic and geofence alerting server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file. Defaults to `~/.safetrail/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// JSON zone file, re-read on every geofence refresh.
    #[arg(long)]
    zones: Option<PathBuf>,

    /// Log level filter, e.g. `info` or `safetrail_server=debug`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply flag overrides on top of loaded settings.
    fn apply(&self, settings: &mut SafetrailSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(zones) = &self.zones {
            settings.geofence.zones_file = Some(zones.display().to_string());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn zone_source(settings: &SafetrailSettings) -> Arc<dyn ZoneSource> {
    match &settings.geofence.zones_file {
        Some(path) => Arc::new(JsonFileZoneSource::new(path)),
        None => Arc::new(StaticZoneSource::new(settings.geofence.zones.clone())),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                let _ = sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    init_subscriber(&settings.logging.level, settings.logging.json);
    info!(settings = %path.display(), "settings loaded");

    let metrics = safetrail_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = SafetrailServer::new(&settings, zone_source(&settings)).with_metrics(metrics);

    match server.hub().geofence.refresh().await {
        Ok(count) => info!(zones = count, "zones loaded"),
        Err(e) => warn!(error = %e, "initial zone load failed, will retry in background"),
    }

    let addr = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.bind_addr()))?;
    info!(%addr, "safetrail ready");

    shutdown_signal().await;
    server.shutdown_gracefully().await;
    Ok(())
}
