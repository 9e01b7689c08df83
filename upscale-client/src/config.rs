//! Tracker configuration
//!
//! Defines the backend location, which transport follows a job, and the
//! parameters of each transport.

use std::time::Duration;
use upscale_core::status::TransportKind;
use url::Url;

/// Placeholder substituted with the job id in URL templates
pub const JOB_ID_PLACEHOLDER: &str = "{job_id}";

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

/// Polling transport parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Status URL template containing `{job_id}`
    pub endpoint_template: String,

    /// Time between two status requests
    pub interval: Duration,

    /// Ticks allowed before the job times out
    pub max_attempts: u32,
}

/// Push transport parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PushConfig {
    /// Channel URL template containing `{job_id}`
    pub channel_template: String,
}

/// Client configuration
///
/// Timeouts are expressed as attempt counts for polling so that a fake clock
/// reaches `TIMEOUT` deterministically.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Service base URL (e.g., "http://127.0.0.1:8000")
    pub backend_url: String,

    /// Transport used to follow submitted jobs
    pub transport: TransportKind,

    pub poll: PollConfig,

    pub push: PushConfig,

    /// Maximum time a submission request may take
    pub submit_timeout: Duration,
}

impl TrackerConfig {
    /// Creates a configuration with defaults derived from the backend URL
    pub fn new(backend_url: impl Into<String>) -> Self {
        let backend_url = backend_url.into();
        let base = backend_url.trim_end_matches('/');

        Self {
            poll: PollConfig {
                endpoint_template: format!("{}/task/{}", base, JOB_ID_PLACEHOLDER),
                interval: Duration::from_millis(1000),
                max_attempts: 60,
            },
            push: PushConfig {
                channel_template: format!("{}/ws/task/{}", websocket_base(base), JOB_ID_PLACEHOLDER),
            },
            transport: TransportKind::Poll,
            submit_timeout: Duration::from_secs(30),
            backend_url,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognised environment variables, all optional:
    /// - UPSCALE_BACKEND_URL (default: http://127.0.0.1:8000)
    /// - UPSCALE_TRANSPORT (poll or push, default: poll)
    /// - UPSCALE_STATUS_TEMPLATE (default: {backend}/task/{job_id})
    /// - UPSCALE_CHANNEL_TEMPLATE (default: ws://{backend host}/ws/task/{job_id})
    /// - UPSCALE_POLL_INTERVAL_MS (default: 1000)
    /// - UPSCALE_MAX_ATTEMPTS (default: 60)
    /// - UPSCALE_SUBMIT_TIMEOUT_SECS (default: 30)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`TrackerConfig::from_env`] with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_url = lookup("UPSCALE_BACKEND_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let mut config = Self::new(backend_url);

        if let Some(transport) = lookup("UPSCALE_TRANSPORT") {
            config.transport = transport
                .parse()
                .map_err(|e| anyhow::anyhow!("UPSCALE_TRANSPORT: {}", e))?;
        }

        if let Some(template) = lookup("UPSCALE_STATUS_TEMPLATE") {
            config.poll.endpoint_template = template;
        }

        if let Some(template) = lookup("UPSCALE_CHANNEL_TEMPLATE") {
            config.push.channel_template = template;
        }

        if let Some(interval) = lookup("UPSCALE_POLL_INTERVAL_MS").and_then(|s| s.parse::<u64>().ok())
        {
            config.poll.interval = Duration::from_millis(interval);
        }

        if let Some(max_attempts) = lookup("UPSCALE_MAX_ATTEMPTS").and_then(|s| s.parse::<u32>().ok())
        {
            config.poll.max_attempts = max_attempts;
        }

        if let Some(timeout) =
            lookup("UPSCALE_SUBMIT_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok())
        {
            config.submit_timeout = Duration::from_secs(timeout);
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend_url.is_empty() {
            anyhow::bail!("backend_url cannot be empty");
        }

        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            anyhow::bail!("backend_url must start with http:// or https://");
        }

        if self.poll.endpoint_template.is_empty() {
            anyhow::bail!("status endpoint template cannot be empty");
        }

        if !self.poll.endpoint_template.contains(JOB_ID_PLACEHOLDER) {
            anyhow::bail!("status endpoint template must contain {}", JOB_ID_PLACEHOLDER);
        }

        if !self.push.channel_template.starts_with("ws://")
            && !self.push.channel_template.starts_with("wss://")
        {
            anyhow::bail!("channel template must start with ws:// or wss://");
        }

        if !self.push.channel_template.contains(JOB_ID_PLACEHOLDER) {
            anyhow::bail!("channel template must contain {}", JOB_ID_PLACEHOLDER);
        }

        if self.poll.interval.is_zero() {
            anyhow::bail!("poll interval must be greater than 0");
        }

        if self.poll.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        if self.submit_timeout.is_zero() {
            anyhow::bail!("submit_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_URL)
    }
}

/// Substitutes the job id into a URL template
///
/// The id is percent-encoded as a single path segment, so an opaque id
/// carrying `/`, `?` or `#` still names one resource.
pub fn render_template(template: &str, job_id: &str) -> String {
    template.replace(JOB_ID_PLACEHOLDER, &encode_path_segment(job_id))
}

/// Percent-encodes `value` for use as one URL path segment
pub(crate) fn encode_path_segment(value: &str) -> String {
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return value.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(value);
    }
    url.path().trim_start_matches('/').to_string()
}

fn websocket_base(http_base: &str) -> String {
    if let Some(rest) = http_base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = http_base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        http_base.to_string()
    }
}
