//! Upscale HTTP Client
//!
//! Client side of the upscaling service: task submission, status transports
//! (interval polling and a per-job push channel) and the lifecycle tracker
//! that drives one outstanding job to a terminal state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use upscale_client::{JobLifecycleTracker, TaskSubmitter, TrackerConfig, UpscaleClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TrackerConfig::default();
//!     let client = Arc::new(UpscaleClient::from_config(&config));
//!
//!     let image = std::fs::read("photo.png")?;
//!     let submitted = client.submit(&image, 2.0).await?;
//!
//!     let mut tracker = JobLifecycleTracker::with_http(client, config);
//!     tracker.track(submitted);
//!     let state = tracker.run_until_terminal().await;
//!
//!     println!("job finished: {:?}", state);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
mod tasks;
pub mod tracker;
pub mod transport;

// Re-export commonly used types
pub use config::{PollConfig, PushConfig, TrackerConfig};
pub use error::{ClientError, Result};
pub use tasks::{SubmittedJob, TaskSubmitter};
pub use tracker::{EventDisposition, JobLifecycleTracker, JobSnapshot};
pub use transport::{TransportAdapter, TransportError, TransportFactory};

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use upscale_core::dto::task::ApiErrorBody;

/// Default time allowed for a submission request
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for a single status request
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the upscaling service
///
/// Covers the three endpoints the client needs:
/// - Task submission (`POST /upscale_all_methods/`)
/// - Task status (`GET /task/{id}`, also used by the polling transport)
/// - Health probe (`GET /`)
#[derive(Debug, Clone)]
pub struct UpscaleClient {
    /// Base URL of the service (e.g., "http://127.0.0.1:8000")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Timeout applied to submission requests
    submit_timeout: Duration,
    /// Timeout applied to each status request
    status_timeout: Duration,
}

impl UpscaleClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use upscale_client::UpscaleClient;
    ///
    /// let client = UpscaleClient::new("http://127.0.0.1:8000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
        }
    }

    /// Create a client for the backend named in a tracker configuration
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.backend_url.as_str()).with_submit_timeout(config.submit_timeout)
    }

    /// Override the submission timeout
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Override the per-request status timeout
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn submit_timeout(&self) -> Duration {
        self.submit_timeout
    }

    pub fn status_timeout(&self) -> Duration {
        self.status_timeout
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Non-2xx responses are turned into [`ClientError::ApiError`], using the
    /// `detail` field of the error body when the service sent one.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = self.check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response and return the raw body
    async fn handle_text_response(&self, response: reqwest::Response) -> Result<String> {
        let response = self.check_status(response).await?;
        Ok(response.text().await?)
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&error_text)
                .ok()
                .and_then(|body| body.detail_text())
                .unwrap_or_else(|| format!("server error: {}", status.as_u16()));
            return Err(ClientError::api_error(status.as_u16(), message));
        }

        Ok(response)
    }
}
