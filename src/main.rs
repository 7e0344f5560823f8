//! # tether
//!
//! WebSocket heartbeat and echo server binary: loads settings, installs
//! logging and metrics, then serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tether_logging::LogFormat;
use tether_server::{ServerConfig, SessionConfig, TetherServer};
use tether_settings::TetherSettings;

/// WebSocket heartbeat and echo server.
#[derive(Parser, Debug)]
#[command(name = "tether", about = "WebSocket heartbeat and echo server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.tether/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log output format (overrides settings).
    #[arg(long, value_enum)]
    log_format: Option<FormatArg>,

    /// Default log level when `RUST_LOG` is unset (overrides settings).
    #[arg(long, value_parser = level_name)]
    log_level: Option<String>,
}

fn level_name(s: &str) -> Result<String, String> {
    tether_logging::parse_level(s)
        .map(|_| s.trim().to_lowercase())
        .ok_or_else(|| format!("unknown log level '{s}'"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Pretty,
    Json,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(tether_settings::loader::settings_path)
    }

    /// Command-line flags win over the settings file and environment.
    fn apply(&self, settings: &mut TetherSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(format) = self.log_format {
            settings.logging.json = format == FormatArg::Json;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.settings_path();
    let mut settings = tether_settings::loader::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    tether_logging::init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    )
    .context("Failed to initialize logging")?;

    let mut server = TetherServer::new(
        ServerConfig::from(&settings.server),
        SessionConfig::from(&settings.liveness),
    );
    match tether_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    tracing::info!(%addr, "tether ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown();
    let _ = handle.await;
    server.wait_for_sessions().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
