//! Task-related API endpoints

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info};
use upscale_core::dto::task::{HealthResponse, SubmitTaskRequest, SubmitTaskResponse};
use upscale_core::status::{NormalizedStatus, TransportKind, normalize};
use upscale_core::validation::{ImageFormat, validate_image, validate_scale_factor};

use crate::UpscaleClient;
use crate::config::encode_path_segment;
use crate::error::{ClientError, Result};

/// A job the service has accepted
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedJob {
    pub job_id: String,
    pub scale_factor: f64,
}

impl SubmittedJob {
    pub fn new(job_id: impl Into<String>, scale_factor: f64) -> Self {
        Self {
            job_id: job_id.into(),
            scale_factor,
        }
    }
}

/// Starts remote jobs
///
/// Tracking begins only after a job id exists, so submission failures never
/// reach the tracker.
#[async_trait]
pub trait TaskSubmitter: Send + Sync {
    /// Validates the image and scale factor, then asks the service to run
    /// every method on it
    async fn submit(&self, image: &[u8], scale_factor: f64) -> Result<SubmittedJob>;
}

#[async_trait]
impl TaskSubmitter for UpscaleClient {
    async fn submit(&self, image: &[u8], scale_factor: f64) -> Result<SubmittedJob> {
        let format = validate_image(image)?;
        validate_scale_factor(scale_factor)?;

        let request = SubmitTaskRequest::all_methods(encode_data_url(format, image), scale_factor);
        self.submit_task(&request).await
    }
}

/// Encodes an image as a `data:` URL
pub fn encode_data_url(format: ImageFormat, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes))
}

impl UpscaleClient {
    // =============================================================================
    // Task Lifecycle
    // =============================================================================

    /// Submit a prepared request
    ///
    /// No validation happens here; [`TaskSubmitter::submit`] is the checked
    /// entry point.
    pub async fn submit_task(&self, req: &SubmitTaskRequest) -> Result<SubmittedJob> {
        let url = format!("{}/upscale_all_methods/", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.submit_timeout)
            .json(req)
            .send()
            .await?;

        let body: SubmitTaskResponse = self.handle_response(response).await?;
        let job_id = body
            .task_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ClientError::ParseError("response did not include a task id".to_string()))?;

        info!(job_id = %job_id, scale_factor = req.scale_factor, "Task submitted");
        Ok(SubmittedJob::new(job_id, req.scale_factor))
    }

    /// Default status URL for a job
    pub fn status_url(&self, job_id: &str) -> String {
        format!("{}/task/{}", self.base_url, encode_path_segment(job_id))
    }

    /// Fetch the raw status body from a status URL
    pub async fn fetch_status_body(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(self.status_timeout)
            .send()
            .await?;
        let body = self.handle_text_response(response).await?;
        debug!(url = %url, bytes = body.len(), "Fetched task status");
        Ok(body)
    }

    /// Fetch and normalize a single status payload
    ///
    /// A payload the client cannot make sense of still comes back as
    /// `Ok(NormalizedStatus::Error(..))`; `Err` is reserved for HTTP faults.
    pub async fn fetch_status(&self, url: &str) -> Result<NormalizedStatus> {
        let body = self.fetch_status_body(url).await?;
        Ok(normalize(TransportKind::Poll, &body))
    }

    // =============================================================================
    // Health
    // =============================================================================

    /// Probe the service root
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use upscale_core::status::StatusTag;
    use upscale_core::validation::ValidationError;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_BYTES: [u8; 12] = [
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
    ];

    #[test]
    fn test_encode_data_url() {
        let url = encode_data_url(ImageFormat::Png, b"abc");
        assert_eq!(url, "data:image/png;base64,YWJj");
    }

    #[tokio::test]
    async fn test_submit_returns_task_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upscale_all_methods/"))
            .and(body_partial_json(json!({"scale_factor": 2.0, "algorithm": "all"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "abc-123"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = UpscaleClient::new(mock_server.uri());
        let job = client.submit(&PNG_BYTES, 2.0).await.unwrap();

        assert_eq!(job, SubmittedJob::new("abc-123", 2.0));
    }

    #[tokio::test]
    async fn test_submit_surfaces_error_detail() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upscale_all_methods/"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"detail": "Invalid image data"})),
            )
            .mount(&mock_server)
            .await;

        let client = UpscaleClient::new(mock_server.uri());
        let err = client.submit(&PNG_BYTES, 2.0).await.unwrap_err();

        match err {
            ClientError::ApiError { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid image data");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_without_detail_uses_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upscale_all_methods/"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&mock_server)
            .await;

        let client = UpscaleClient::new(mock_server.uri());
        let err = client.submit(&PNG_BYTES, 2.0).await.unwrap_err();

        assert!(err.is_server_error());
        assert!(err.to_string().contains("server error: 502"));
    }

    #[tokio::test]
    async fn test_submit_requires_task_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upscale_all_methods/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued"})))
            .mount(&mock_server)
            .await;

        let client = UpscaleClient::new(mock_server.uri());
        let err = client.submit(&PNG_BYTES, 2.0).await.unwrap_err();

        assert!(matches!(err, ClientError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_invalid_submission_sends_nothing() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "x"})))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = UpscaleClient::new(mock_server.uri());

        let err = client.submit(b"GIF89a....", 2.0).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidSubmission(ValidationError::UnsupportedFormat)
        ));

        let err = client.submit(&PNG_BYTES, 9.0).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidSubmission(ValidationError::ScaleFactorOutOfRange(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_status_normalizes() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/task/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
            .mount(&mock_server)
            .await;

        let client = UpscaleClient::new(mock_server.uri());
        let url = client.status_url("abc");
        let status = client.fetch_status(&url).await.unwrap();

        assert_eq!(status.tag(), StatusTag::Pending);
    }

    #[tokio::test]
    async fn test_fetch_status_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/task/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Task not found"})))
            .mount(&mock_server)
            .await;

        let client = UpscaleClient::new(mock_server.uri());
        let err = client
            .fetch_status(&client.status_url("missing"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_status_gives_up_on_silent_server() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/task/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "PENDING"}))
                    .set_delay(std::time::Duration::from_secs(30)),
            )
            .mount(&mock_server)
            .await;

        let client = UpscaleClient::new(mock_server.uri())
            .with_status_timeout(std::time::Duration::from_millis(100));
        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.fetch_status(&client.status_url("slow")),
        )
        .await
        .expect("status request ignored its timeout");

        assert!(matches!(outcome, Err(ClientError::RequestFailed(_))));
    }

    #[test]
    fn test_status_url_encodes_job_id() {
        let client = UpscaleClient::new("http://127.0.0.1:8000/");
        assert_eq!(client.status_url("abc-123"), "http://127.0.0.1:8000/task/abc-123");
        assert_eq!(client.status_url("a/b?c"), "http://127.0.0.1:8000/task/a%2Fb%3Fc");
    }

    #[tokio::test]
    async fn test_health() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message": "Image Upscaler API"})),
            )
            .mount(&mock_server)
            .await;

        let client = UpscaleClient::new(mock_server.uri());
        let health = client.health().await.unwrap();

        assert_eq!(health.message, "Image Upscaler API");
    }
}
