//! Upscale CLI
//!
//! Command-line interface for submitting images to the upscaling service and
//! following the resulting jobs.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::{Config, Overrides};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upscale_core::status::TransportKind;

#[derive(Parser)]
#[command(name = "upscale")]
#[command(about = "Compare image upscaling methods", long_about = None)]
struct Cli {
    /// Upscaling service URL
    #[arg(long, env = "UPSCALE_BACKEND_URL")]
    backend_url: Option<String>,

    /// How to follow a job: poll or push
    #[arg(long, env = "UPSCALE_TRANSPORT")]
    transport: Option<TransportKind>,

    /// Milliseconds between two status requests
    #[arg(long, env = "UPSCALE_POLL_INTERVAL_MS")]
    interval_ms: Option<u64>,

    /// Status requests allowed before giving up
    #[arg(long, env = "UPSCALE_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upscale_cli=info,upscale_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::load(&Overrides {
        backend_url: cli.backend_url,
        transport: cli.transport,
        interval_ms: cli.interval_ms,
        max_attempts: cli.max_attempts,
    })?;

    debug!(
        backend_url = %config.tracker.backend_url,
        transport = %config.tracker.transport,
        "Configuration loaded"
    );

    handle_command(cli.command, &config).await
}
