//! Configuration module
//!
//! Resolves the tracker configuration from command-line flags layered over
//! the `UPSCALE_*` environment variables.

use anyhow::{Context, Result};
use std::collections::HashMap;
use upscale_client::TrackerConfig;
use upscale_core::status::TransportKind;

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend_url: Option<String>,
    pub transport: Option<TransportKind>,
    pub interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl Overrides {
    fn as_vars(&self) -> HashMap<&'static str, String> {
        let mut vars = HashMap::new();
        if let Some(url) = &self.backend_url {
            vars.insert("UPSCALE_BACKEND_URL", url.clone());
        }
        if let Some(transport) = self.transport {
            vars.insert("UPSCALE_TRANSPORT", transport.to_string());
        }
        if let Some(interval) = self.interval_ms {
            vars.insert("UPSCALE_POLL_INTERVAL_MS", interval.to_string());
        }
        if let Some(max_attempts) = self.max_attempts {
            vars.insert("UPSCALE_MAX_ATTEMPTS", max_attempts.to_string());
        }
        vars
    }
}

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend location and transport settings
    pub tracker: TrackerConfig,
}

impl Config {
    /// Flags win over the environment; everything else falls back to defaults
    pub fn load(overrides: &Overrides) -> Result<Self> {
        Self::load_with(overrides, |key| std::env::var(key).ok())
    }

    fn load_with<F>(overrides: &Overrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = overrides.as_vars();
        let tracker = TrackerConfig::from_lookup(|key| vars.get(key).cloned().or_else(|| env(key)))?;
        tracker.validate().context("Invalid configuration")?;

        Ok(Self { tracker })
    }
}
