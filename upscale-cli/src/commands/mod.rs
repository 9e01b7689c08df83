//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod health;
mod job;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;
use upscale_core::reconcile::Metric;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit an image and follow the job until it finishes
    Submit {
        /// PNG, JPEG or WEBP image, at most 5 MB
        image: PathBuf,

        /// Scale factor, greater than 1 and at most 8
        #[arg(short, long, default_value_t = 2.0)]
        scale: f64,

        /// Order the result table by this metric (psnr, ssim, mse, gradient-diff, time)
        #[arg(long)]
        sort: Option<Metric>,

        /// Print the job id and exit without waiting
        #[arg(long)]
        no_wait: bool,
    },
    /// Follow an already submitted job
    Watch {
        /// Job ID returned on submission
        job_id: String,

        /// Scale factor the job was submitted with
        #[arg(short, long, default_value_t = 2.0)]
        scale: f64,

        /// Order the result table by this metric
        #[arg(long)]
        sort: Option<Metric>,
    },
    /// Query a job's status once
    Status {
        /// Job ID returned on submission
        job_id: String,
    },
    /// Check that the service is reachable
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Submit {
            image,
            scale,
            sort,
            no_wait,
        } => job::submit(config, &image, scale, sort, no_wait).await,
        Commands::Watch {
            job_id,
            scale,
            sort,
        } => job::watch(config, job_id, scale, sort).await,
        Commands::Status { job_id } => job::status(config, &job_id).await,
        Commands::Health => health::check(config).await,
    }
}
