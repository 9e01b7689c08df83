//! Job command handlers
//!
//! Handles submitting images, following jobs to completion and rendering
//! the per-method comparison.

use anyhow::{Context, Result, bail};
use colored::*;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use upscale_client::config::render_template;
use upscale_client::{JobLifecycleTracker, JobSnapshot, SubmittedJob, TaskSubmitter, UpscaleClient};
use upscale_core::domain::job::{Job, JobState};
use upscale_core::reconcile::{Metric, MethodScores, Reconciliation, reconcile};
use upscale_core::status::NormalizedStatus;

use crate::config::Config;

/// Submit an image, then follow the job unless asked not to
pub async fn submit(
    config: &Config,
    image: &Path,
    scale: f64,
    sort: Option<Metric>,
    no_wait: bool,
) -> Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read {}", image.display()))?;

    let client = Arc::new(UpscaleClient::from_config(&config.tracker));
    let submitted = client
        .submit(&bytes, scale)
        .await
        .context("Submission failed")?;

    println!(
        "{} Submitted job {}",
        "✓".green(),
        submitted.job_id.cyan()
    );

    if no_wait {
        return Ok(());
    }

    follow(config, client, submitted, sort).await
}

/// Follow a job that was submitted earlier
pub async fn watch(config: &Config, job_id: String, scale: f64, sort: Option<Metric>) -> Result<()> {
    let client = Arc::new(UpscaleClient::from_config(&config.tracker));
    follow(config, client, SubmittedJob::new(job_id, scale), sort).await
}

/// Fetch and print a single status
pub async fn status(config: &Config, job_id: &str) -> Result<()> {
    let client = UpscaleClient::from_config(&config.tracker);
    let url = render_template(&config.tracker.poll.endpoint_template, job_id);

    let status = client
        .fetch_status(&url)
        .await
        .with_context(|| format!("Failed to fetch status of job {}", job_id))?;

    println!("{}", "Job Status:".bold());
    println!("  ID:       {}", job_id.cyan());
    println!("  Status:   {}", colorize_state(status.target_state()));

    match &status {
        NormalizedStatus::Progress(percent) => println!("  Progress: {}%", percent),
        NormalizedStatus::Success(outcome) => {
            let methods: Vec<&str> = outcome.results.keys().map(String::as_str).collect();
            println!("  Methods:  {}", methods.join(", "));
            if let Ok(reconciliation) = reconcile(&outcome.results) {
                print_best(&reconciliation);
            }
        }
        NormalizedStatus::Failure(info) | NormalizedStatus::Error(info) => {
            println!("\n{}", "Error:".bold());
            println!("{}", info.to_string().red());
        }
        NormalizedStatus::Initiated | NormalizedStatus::Pending => {}
    }

    Ok(())
}

enum Outcome {
    Finished,
    Interrupted,
}

/// Track a job until it is terminal or the user interrupts
async fn follow(
    config: &Config,
    client: Arc<UpscaleClient>,
    submitted: SubmittedJob,
    sort: Option<Metric>,
) -> Result<()> {
    let mut tracker = JobLifecycleTracker::with_http(client, config.tracker.clone());
    let printer = tokio::spawn(print_progress(tracker.subscribe()));

    println!(
        "{} Following job {} ({})",
        "▸".cyan(),
        submitted.job_id.dimmed(),
        config.tracker.transport
    );
    tracker.track(submitted);

    let outcome = tokio::select! {
        _ = tracker.run_until_terminal() => Outcome::Finished,
        _ = tokio::signal::ctrl_c() => Outcome::Interrupted,
    };

    if let Outcome::Interrupted = outcome {
        tracker.halt();
        drop(tracker);
        let _ = printer.await;
        println!("{}", "Interrupted, no longer following the job.".yellow());
        return Ok(());
    }

    let job = tracker.job().cloned();
    let reconciliation = tracker.reconciliation();
    drop(tracker);
    let _ = printer.await;

    let Some(job) = job else {
        bail!("No job was tracked");
    };

    if job.state() != JobState::Success {
        print_failure(&job);
        bail!("Job {} finished with {}", job.id(), job.state());
    }

    match reconciliation {
        Some(reconciliation) => print_results(&job, &reconciliation, sort),
        None => println!("{}", "Job succeeded without results.".yellow()),
    }
    Ok(())
}

/// Print a line whenever the state or progress changes
async fn print_progress(mut snapshots: watch::Receiver<Option<JobSnapshot>>) {
    let mut last = None;

    while snapshots.changed().await.is_ok() {
        let Some(snapshot) = snapshots.borrow_and_update().clone() else {
            continue;
        };

        let key = (snapshot.state, snapshot.progress_percent);
        if snapshot.state.is_terminal() || last == Some(key) {
            continue;
        }
        last = Some(key);

        match snapshot.progress_percent {
            Some(percent) => println!("  {} {}%", colorize_state(snapshot.state), percent),
            None => println!("  {}", colorize_state(snapshot.state)),
        }
    }
}

/// Print error information of a failed job
fn print_failure(job: &Job) {
    println!("\n{}", "Job failed:".bold());
    println!("  ID:     {}", job.id().cyan());
    println!("  Status: {}", colorize_state(job.state()));
    if let Some(elapsed) = elapsed(job) {
        println!("  After:  {}", elapsed);
    }

    if let Some(error) = job.error_info() {
        println!("\n{}", "Error:".bold());
        println!("{}", error.message.red());
        if let Some(details) = &error.details {
            println!("{}", details.dimmed());
        }
    }
}

/// Wall time between tracking start and the terminal state
fn elapsed(job: &Job) -> Option<String> {
    let finished = job.finished_at()?;
    let millis = (finished - job.created_at()).num_milliseconds().max(0);
    Some(format!("{:.1}s", millis as f64 / 1000.0))
}

/// Print the comparison table with the best value of each metric highlighted
fn print_results(job: &Job, reconciliation: &Reconciliation, sort: Option<Metric>) {
    println!("\n{}", format!("Results for job {}:", job.id()).bold());
    println!("  Scale:    x{}", job.scale_factor());
    if let Some(elapsed) = elapsed(job) {
        println!("  Elapsed:  {}", elapsed);
    }
    if let Some(dims) = job.original_dimensions() {
        println!("  Original: {}", dims);
    }
    if let Some(metric) = sort {
        println!("  Sorted by {}", metric.label());
    }
    println!();

    let rows = ordered_rows(reconciliation, sort);
    let name_width = rows
        .iter()
        .map(|scores| scores.name.len())
        .max()
        .unwrap_or(0)
        .max("Method".len());

    let mut header = format!("  {:<width$}", "Method", width = name_width);
    for metric in Metric::ALL {
        header.push_str(&format!(" {:>14}", metric.label()));
    }
    header.push_str(&format!(" {:>12}", "Output"));
    println!("{}", header.bold());
    println!("  {}", "─".repeat(header.len() - 2).dimmed());

    for scores in rows {
        print!("  {}", format!("{:<width$}", scores.name, width = name_width).cyan());
        for metric in Metric::ALL {
            let cell = format!(" {:>14}", metric.format(scores));
            if reconciliation.is_best(&scores.name, metric) {
                print!("{}", cell.green().bold());
            } else {
                print!("{}", cell);
            }
        }

        let output = job
            .result_set()
            .and_then(|results| results.get(&scores.name))
            .map(|result| result.output_dimensions.to_string())
            .unwrap_or_default();
        println!(" {}", format!("{:>12}", output).dimmed());
    }

    print_best(reconciliation);

    if let Some(results) = job.result_set() {
        for (name, result) in results {
            if let Some(message) = &result.message {
                println!("  {} {}", format!("{}:", name).dimmed(), message.dimmed());
            }
        }
    }
}

fn print_best(reconciliation: &Reconciliation) {
    println!("\n{}", "Best methods:".bold());
    for metric in Metric::ALL {
        println!(
            "  {:<14} {}",
            metric.label(),
            reconciliation.best().for_metric(metric).green()
        );
    }
}

/// Rows in reported order, or ranked by `sort`
fn ordered_rows(reconciliation: &Reconciliation, sort: Option<Metric>) -> Vec<&MethodScores> {
    match sort {
        Some(metric) => reconciliation.ranking(metric),
        None => reconciliation.scores().iter().collect(),
    }
}

/// Colorize job state for display
fn colorize_state(state: JobState) -> colored::ColoredString {
    let state_str = state.to_string();
    match state {
        JobState::Initiated => state_str.dimmed(),
        JobState::Pending => state_str.yellow(),
        JobState::Progress => state_str.cyan(),
        JobState::Success => state_str.green(),
        JobState::Failure | JobState::Error => state_str.red(),
        JobState::Timeout => state_str.red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upscale_core::domain::method::ResultSet;

    fn results() -> ResultSet {
        serde_json::from_str(
            r#"{
                "bilinear": {"upscaled_shape": [4, 4], "psnr": 30.5, "ssim": 0.91, "mse": 12.3, "gradient_diff": 5.0, "processing_time": 0.12},
                "bicubic": {"upscaled_shape": [4, 4], "psnr": 32.1, "ssim": 0.94, "mse": 9.8, "gradient_diff": 4.1, "processing_time": 0.20},
                "lanczos": {"upscaled_shape": [4, 4], "psnr": "infinity", "ssim": 1.0, "mse": 0.0, "gradient_diff": 0.0, "processing_time": 0.35}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_elapsed_only_for_finished_jobs() {
        let mut job = Job::new("job-1", 2.0);
        assert_eq!(elapsed(&job), None);

        job.time_out(60).unwrap();
        let shown = elapsed(&job).unwrap();
        assert!(shown.ends_with('s'), "unexpected elapsed: {}", shown);
    }

    #[test]
    fn test_ordered_rows() {
        let reconciliation = reconcile(&results()).unwrap();

        let names = |rows: Vec<&MethodScores>| -> Vec<String> {
            rows.into_iter().map(|s| s.name.clone()).collect()
        };

        assert_eq!(
            names(ordered_rows(&reconciliation, None)),
            vec!["bilinear", "bicubic", "lanczos"]
        );
        assert_eq!(
            names(ordered_rows(&reconciliation, Some(Metric::Psnr))),
            vec!["lanczos", "bicubic", "bilinear"]
        );
        assert_eq!(
            names(ordered_rows(&reconciliation, Some(Metric::ProcessingTime))),
            vec!["bilinear", "bicubic", "lanczos"]
        );
    }
}
