// hookrelay - Main Entry Point
//
// Commands:
// - serve: run the webhook HTTP API
// - sign: compute the signature header for a payload
// - check-config: validate and print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hookrelay::api::{self, AppState};
use hookrelay::config::Config;
use hookrelay::logging;
use hookrelay::webhooks::signing::{sign, signature_header_value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long shutdown waits for running delivery chains
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// hookrelay: signed webhook delivery with retries
#[derive(Parser, Debug)]
#[command(name = "hookrelay")]
#[command(version)]
#[command(about = "Webhook delivery engine with signed payloads and retries", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address, overrides the configured one
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the X-Hub-Signature value for a JSON payload
    Sign {
        /// Subscription secret
        #[arg(long)]
        secret: String,

        /// Payload as JSON text
        payload: String,
    },
    /// Validate the configuration and print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Commands::Sign { secret, payload } = &args.command {
        return sign_payload(secret, payload);
    }

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    match args.command {
        Commands::Serve { bind } => {
            logging::init(&config.logging, args.verbose)?;
            serve(config, bind).await?;
        }
        Commands::CheckConfig => {
            let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", text);
        }
        Commands::Sign { .. } => {}
    }

    Ok(())
}

fn sign_payload(secret: &str, payload: &str) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("Payload is not valid JSON")?;
    println!("{}", signature_header_value(&sign(&payload, secret)));
    Ok(())
}

async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let addr: SocketAddr = match bind {
        Some(bind) => bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", bind))?,
        None => config.bind_addr()?,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        max_retries = config.delivery.max_retries,
        base_delay_ms = config.delivery.base_delay_ms,
        rate_limit = config.rate_limit.enabled,
        "hookrelay starting"
    );

    let state = AppState::from_config(&config)?;
    let service = state.service.clone();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    api::serve(addr, state, shutdown).await?;

    if tokio::time::timeout(DRAIN_TIMEOUT, service.wait_idle())
        .await
        .is_err()
    {
        warn!(
            active_chains = service.active_chains().await,
            "Shutting down with delivery chains still pending"
        );
    }

    Ok(())
}
