//! Health command handler

use anyhow::{Context, Result};
use colored::*;
use upscale_client::UpscaleClient;

use crate::config::Config;

/// Probe the service root and print its greeting
pub async fn check(config: &Config) -> Result<()> {
    let client = UpscaleClient::from_config(&config.tracker);

    let health = client
        .health()
        .await
        .with_context(|| format!("Service at {} is not reachable", client.base_url()))?;

    println!(
        "{} {} ({})",
        "✓".green(),
        health.message,
        client.base_url().dimmed()
    );
    Ok(())
}
