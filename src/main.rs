//! # relay
//!
//! WebSocket broadcast relay binary: loads settings, installs logging and
//! metrics, runs the server until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::{RelayServer, ServerConfig};
use relay_settings::RelaySettings;
use relay_telemetry::{LogFormat, TelemetryConfig, init_telemetry};
use tracing::{info, warn};

/// Real-time WebSocket broadcast relay.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "Timestamping WebSocket broadcast relay")]
struct Cli {
    /// Listen address, e.g. `http://localhost:8080/` or `0.0.0.0:9000`.
    #[arg(long)]
    bind: Option<String>,

    /// JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log format: `pretty` or `json`.
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Maximum concurrent connections.
    #[arg(long)]
    max_connections: Option<usize>,
}

impl Cli {
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(bind) = &self.bind {
            settings.server.bind.clone_from(bind);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format.to_string();
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = relay_settings::load_settings(cli.config.as_deref())
        .context("failed to load settings")?;
    cli.apply(&mut settings);

    let telemetry = init_telemetry(&TelemetryConfig {
        level: settings.logging.level.clone(),
        format: settings
            .logging
            .format
            .parse()
            .context("invalid logging.format")?,
        capture_capacity: settings.logging.capture_capacity,
    })
    .context("failed to initialise logging")?;

    let config =
        ServerConfig::try_from(&settings.server).context("invalid server configuration")?;

    let mut server = RelayServer::new(config);
    match relay_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics disabled"),
    }

    let addr = server.start().await.context("failed to start relay")?;
    info!(addr = %addr, bind = %server.config().bind, "relay listening, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("received ctrl-c");

    if !server.shutdown().await {
        warn!(
            recent_warnings = telemetry.logs().len(),
            "some connections did not close cleanly"
        );
    }
    Ok(())
}
