//! # Crisp WebHooks Main Entry Point
//!
//! This is the main entry point for the WebHook receiver service.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crisp_webhooks::{config::ConfigLoader, server::run_server, telemetry::init_tracing};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Receives Crisp WebHook notifications.
#[derive(Debug, Parser)]
#[command(name = "crisp-webhooks", version, about)]
struct Cli {
    /// Directory holding the layered `.env` files
    #[arg(long, value_name = "DIR")]
    env_dir: Option<PathBuf>,

    /// Print the loaded configuration (secrets redacted) and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let loader = match cli.env_dir {
        Some(dir) => ConfigLoader::with_base_dir(dir),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("loading configuration")?;

    if cli.print_config {
        println!(
            "{}",
            config
                .redacted_json()
                .context("serializing configuration")?
        );
        return Ok(());
    }

    init_tracing(&config).context("initializing tracing")?;

    info!(profile = %config.profile, "Loaded configuration");
    let configured: Vec<&str> = config.secrets.configured_keys().collect();
    if configured.is_empty() {
        warn!("No WebHook secret keys configured; every request will be answered with 404");
    } else {
        info!(keys = ?configured, "Configured WebHook secret keys");
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    run_server(config, shutdown)
        .await
        .map_err(|err| anyhow!("server error: {err}"))
}
