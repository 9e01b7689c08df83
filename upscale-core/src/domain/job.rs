//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::method::{Dimensions, ResultSet};
use crate::status::NormalizedStatus;

/// One remotely executed upscaling request.
///
/// Created once the service has handed out an id, then mutated only through
/// the transition methods below. Once the job reaches a terminal state every
/// further transition is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    id: String,
    scale_factor: f64,
    state: JobState,
    progress_percent: Option<u8>,
    attempt_count: Option<u32>,
    result_set: Option<ResultSet>,
    original_dimensions: Option<Dimensions>,
    error_info: Option<ErrorInfo>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Initiated,
    Pending,
    Progress,
    Success,
    Failure,
    Error,
    Timeout,
}

impl JobState {
    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Failure | JobState::Error | JobState::Timeout
        )
    }

    /// Terminal states that are shown to the user as a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobState::Failure | JobState::Error | JobState::Timeout
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            JobState::Initiated => "INITIATED",
            JobState::Pending => "PENDING",
            JobState::Progress => "PROGRESS",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
            JobState::Error => "ERROR",
            JobState::Timeout => "TIMEOUT",
        };
        write!(f, "{}", tag)
    }
}

/// Message and optional details attached to a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {}", self.message, details),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Rejected transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job {job_id} is already terminal ({state})")]
    AlreadyTerminal { job_id: String, state: JobState },
}

impl Job {
    /// Creates a job in the `INITIATED` state
    pub fn new(id: impl Into<String>, scale_factor: f64) -> Self {
        Self {
            id: id.into(),
            scale_factor,
            state: JobState::Initiated,
            progress_percent: None,
            attempt_count: None,
            result_set: None,
            original_dimensions: None,
            error_info: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Present only while the job is in `PROGRESS`
    pub fn progress_percent(&self) -> Option<u8> {
        self.progress_percent
    }

    /// Present only when the job is tracked by a polling transport
    pub fn attempt_count(&self) -> Option<u32> {
        self.attempt_count
    }

    /// Present only on `SUCCESS`
    pub fn result_set(&self) -> Option<&ResultSet> {
        self.result_set.as_ref()
    }

    pub fn original_dimensions(&self) -> Option<Dimensions> {
        self.original_dimensions
    }

    /// Present only on `FAILURE`, `ERROR` and `TIMEOUT`
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        self.error_info.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Starts counting poll attempts from zero
    pub fn reset_attempts(&mut self) {
        self.attempt_count = Some(0);
    }

    /// Records one poll attempt and returns the new count
    pub fn record_attempt(&mut self) -> u32 {
        let next = self.attempt_count.unwrap_or(0) + 1;
        self.attempt_count = Some(next);
        next
    }

    /// Applies a normalized status and returns the resulting state.
    ///
    /// Waiting statuses never move the job backwards: a `PENDING` seen while
    /// in `PROGRESS` leaves the job in `PROGRESS`.
    pub fn apply(&mut self, status: NormalizedStatus) -> Result<JobState, TransitionError> {
        self.ensure_active()?;

        match status {
            NormalizedStatus::Initiated => {}
            NormalizedStatus::Pending => {
                if self.state == JobState::Initiated {
                    self.state = JobState::Pending;
                }
            }
            NormalizedStatus::Progress(percent) => {
                self.state = JobState::Progress;
                self.progress_percent = Some(percent.min(100));
            }
            NormalizedStatus::Success(outcome) => {
                if outcome.results.is_empty() {
                    self.finish(
                        JobState::Error,
                        Some(ErrorInfo::new("success reported with an empty result set")),
                    );
                } else {
                    self.result_set = Some(outcome.results);
                    self.original_dimensions = outcome.original_dimensions;
                    self.finish(JobState::Success, None);
                }
            }
            NormalizedStatus::Failure(info) => self.finish(JobState::Failure, Some(info)),
            NormalizedStatus::Error(info) => self.finish(JobState::Error, Some(info)),
        }

        Ok(self.state)
    }

    /// Forces the job into `TIMEOUT` after the poll budget ran out
    pub fn time_out(&mut self, max_attempts: u32) -> Result<JobState, TransitionError> {
        self.ensure_active()?;

        let attempts = self.attempt_count.unwrap_or(0);
        let info = ErrorInfo::new(format!("timed out waiting for job {}", self.id)).with_details(
            format!(
                "no terminal status after {} poll attempts (limit {})",
                attempts, max_attempts
            ),
        );
        self.finish(JobState::Timeout, Some(info));
        Ok(self.state)
    }

    /// Fails the job with a locally diagnosed error
    pub fn fail(&mut self, info: ErrorInfo) -> Result<JobState, TransitionError> {
        self.ensure_active()?;
        self.finish(JobState::Error, Some(info));
        Ok(self.state)
    }

    fn ensure_active(&self) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                job_id: self.id.clone(),
                state: self.state,
            });
        }
        Ok(())
    }

    fn finish(&mut self, state: JobState, error_info: Option<ErrorInfo>) {
        self.state = state;
        self.progress_percent = None;
        self.error_info = error_info;
        self.finished_at = Some(Utc::now());
    }
}
