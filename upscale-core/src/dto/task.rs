//! Task DTOs

use serde::{Deserialize, Serialize};

use crate::domain::method::{Dimensions, ResultSet};

/// Algorithm value that asks the service to run every method
pub const ALL_METHODS: &str = "all";

/// Request to start an upscaling task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    /// Image as a `data:<mime>;base64,<payload>` URL
    pub image_base64: String,
    pub scale_factor: f64,
    pub algorithm: String,
}

impl SubmitTaskRequest {
    /// Request that runs every available method
    pub fn all_methods(image_base64: String, scale_factor: f64) -> Self {
        Self {
            image_base64,
            scale_factor,
            algorithm: ALL_METHODS.to_string(),
        }
    }
}

/// Response to a task submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Error body returned by the service on non-2xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ApiErrorBody {
    /// Human readable detail, if the body carried one
    pub fn detail_text(&self) -> Option<String> {
        match &self.detail {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Response of the service root endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub message: String,
}

/// Status payload as sent by either transport.
///
/// The poll endpoint and the push channel share this envelope but not
/// their vocabulary for `status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    /// Decoded lazily: failed tasks may carry a plain string here
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Some service versions put the result set at the top level
    #[serde(default)]
    pub results: Option<ResultSet>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// Task result nested inside a success payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultPayload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub results: Option<ResultSet>,
    #[serde(default)]
    pub original_shape: Option<Dimensions>,
    #[serde(default)]
    pub error: Option<String>,
}
