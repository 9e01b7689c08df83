//! Status normalization
//!
//! Both transports report job status with overlapping but different string
//! vocabularies. Everything that knows about those strings lives here; the
//! lifecycle tracker only ever sees a [`NormalizedStatus`].
//!
//! Rules:
//! - every literal the service uses for "done" maps to `SUCCESS`
//! - a success without a non-empty result set is an `ERROR`
//! - numeric progress without a terminal literal is `PROGRESS`, clamped to
//!   `0..=100`, defaulting to `0` when absent
//! - unparseable payloads and unknown literals are `ERROR`, never `FAILURE`

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::job::{ErrorInfo, JobState};
use crate::domain::method::{Dimensions, ResultSet};
use crate::dto::task::{ResultPayload, StatusPayload};

/// Message used for every payload that cannot be interpreted
pub const MALFORMED_PAYLOAD: &str = "malformed status payload";

/// Which transport produced a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Interval polling of the HTTP status endpoint
    Poll,
    /// Per-job push channel
    Push,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Poll => write!(f, "poll"),
            TransportKind::Push => write!(f, "push"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" | "polling" | "http" => Ok(TransportKind::Poll),
            "push" | "ws" | "websocket" => Ok(TransportKind::Push),
            other => Err(format!("unknown transport '{}' (expected poll or push)", other)),
        }
    }
}

/// Canonical status tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusTag {
    Initiated,
    Pending,
    Progress,
    Success,
    Failure,
    Error,
}

/// A transport payload mapped onto the canonical vocabulary
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedStatus {
    Initiated,
    Pending,
    /// Percentage in `0..=100`
    Progress(u8),
    Success(SuccessOutcome),
    /// The service accepted the job and reports that it failed
    Failure(ErrorInfo),
    /// Client or transport level fault
    Error(ErrorInfo),
}

/// Payload of a successful job
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessOutcome {
    pub results: ResultSet,
    pub original_dimensions: Option<Dimensions>,
}

impl NormalizedStatus {
    pub fn tag(&self) -> StatusTag {
        match self {
            NormalizedStatus::Initiated => StatusTag::Initiated,
            NormalizedStatus::Pending => StatusTag::Pending,
            NormalizedStatus::Progress(_) => StatusTag::Progress,
            NormalizedStatus::Success(_) => StatusTag::Success,
            NormalizedStatus::Failure(_) => StatusTag::Failure,
            NormalizedStatus::Error(_) => StatusTag::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NormalizedStatus::Success(_) | NormalizedStatus::Failure(_) | NormalizedStatus::Error(_)
        )
    }

    /// Job state this status would move a job into
    pub fn target_state(&self) -> JobState {
        match self {
            NormalizedStatus::Initiated => JobState::Initiated,
            NormalizedStatus::Pending => JobState::Pending,
            NormalizedStatus::Progress(_) => JobState::Progress,
            NormalizedStatus::Success(_) => JobState::Success,
            NormalizedStatus::Failure(_) => JobState::Failure,
            NormalizedStatus::Error(_) => JobState::Error,
        }
    }

    /// Client-side error with the given message
    pub fn error(message: impl Into<String>) -> Self {
        NormalizedStatus::Error(ErrorInfo::new(message))
    }
}

impl fmt::Display for NormalizedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedStatus::Progress(percent) => write!(f, "PROGRESS({})", percent),
            NormalizedStatus::Success(outcome) => {
                write!(f, "SUCCESS({} methods)", outcome.results.len())
            }
            NormalizedStatus::Failure(info) => write!(f, "FAILURE({})", info.message),
            NormalizedStatus::Error(info) => write!(f, "ERROR({})", info.message),
            other => write!(f, "{:?}", other.tag()),
        }
    }
}

/// Status literal classes understood by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Literal {
    Initiated,
    Pending,
    Progress,
    Success,
    Failure,
    ClientError,
}

fn classify(status: &str) -> Option<Literal> {
    // to_uppercase rather than the ASCII variant: "Готово" is a success literal
    match status.trim().to_uppercase().as_str() {
        "INITIATED" => Some(Literal::Initiated),
        "PENDING" | "STARTED" | "RECEIVED" | "RETRY" => Some(Literal::Pending),
        "PROGRESS" => Some(Literal::Progress),
        "SUCCESS" | "READY" | "DONE" | "ГОТОВО" => Some(Literal::Success),
        "FAILURE" | "FAILED" | "REVOKED" => Some(Literal::Failure),
        "ERROR" => Some(Literal::ClientError),
        _ => None,
    }
}

/// Normalizes a raw text payload received from `transport`
pub fn normalize(transport: TransportKind, raw: &str) -> NormalizedStatus {
    match serde_json::from_str::<StatusPayload>(raw) {
        Ok(payload) => normalize_payload(transport, payload),
        Err(e) => malformed(transport, e.to_string()),
    }
}

/// Normalizes an already decoded payload
pub fn normalize_payload(transport: TransportKind, payload: StatusPayload) -> NormalizedStatus {
    let Some(status) = payload.status.as_deref() else {
        return malformed(transport, "status field missing");
    };

    let Some(literal) = classify(status) else {
        return malformed(transport, format!("unrecognized status {:?}", status));
    };

    match literal {
        Literal::Success => success(transport, payload),
        Literal::Progress => NormalizedStatus::Progress(clamp_progress(payload.progress)),
        Literal::Initiated | Literal::Pending => match payload.progress {
            Some(_) => NormalizedStatus::Progress(clamp_progress(payload.progress)),
            None if literal == Literal::Initiated => NormalizedStatus::Initiated,
            None => NormalizedStatus::Pending,
        },
        Literal::Failure => {
            let message = payload
                .error
                .or_else(|| match payload.result {
                    Some(serde_json::Value::String(text)) if !text.is_empty() => Some(text),
                    _ => None,
                })
                .unwrap_or_else(|| "job failed on the server".to_string());
            NormalizedStatus::Failure(ErrorInfo {
                message,
                details: payload.details,
            })
        }
        Literal::ClientError => {
            let message = payload
                .error
                .unwrap_or_else(|| format!("{} channel reported an error", transport));
            NormalizedStatus::Error(ErrorInfo {
                message,
                details: payload.details,
            })
        }
    }
}

fn success(transport: TransportKind, payload: StatusPayload) -> NormalizedStatus {
    let (nested, top_level) = (payload.result, payload.results);

    let nested = match nested {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => match serde_json::from_value::<ResultPayload>(value) {
            Ok(result) => Some(result),
            Err(e) => return malformed(transport, format!("result: {}", e)),
        },
    };

    let mut original_dimensions = None;
    let results = match nested {
        Some(result) => {
            // The worker wraps its own failures in a successful task
            if result
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("error"))
            {
                let message = result
                    .error
                    .unwrap_or_else(|| "job failed on the server".to_string());
                return NormalizedStatus::Failure(ErrorInfo::new(message));
            }
            original_dimensions = result.original_shape;
            result.results.or(top_level)
        }
        None => top_level,
    };

    match results {
        None => NormalizedStatus::Error(
            ErrorInfo::new("success reported without a result set")
                .with_details(format!("{} payload carried no results", transport)),
        ),
        Some(results) if results.is_empty() => NormalizedStatus::Error(
            ErrorInfo::new("success reported with an empty result set")
                .with_details(format!("{} payload carried an empty results map", transport)),
        ),
        Some(results) => NormalizedStatus::Success(SuccessOutcome {
            results,
            original_dimensions,
        }),
    }
}

fn malformed(transport: TransportKind, reason: impl fmt::Display) -> NormalizedStatus {
    NormalizedStatus::Error(
        ErrorInfo::new(MALFORMED_PAYLOAD).with_details(format!("{} payload: {}", transport, reason)),
    )
}

/// Clamps a reported progress value to a whole percentage.
///
/// A missing value is 0, not "unchanged".
pub fn clamp_progress(progress: Option<f64>) -> u8 {
    match progress {
        Some(value) if value.is_finite() => value.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METHOD: &str = r#"{"upscaled_shape": [4, 4], "psnr": 30.5, "ssim": 0.91, "mse": 12.3, "gradient_diff": 5.0, "processing_time": 0.12}"#;

    fn error_message(status: &NormalizedStatus) -> &str {
        match status {
            NormalizedStatus::Error(info) => &info.message,
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_localized_ready_literal_is_success() {
        let raw = format!(
            r#"{{"status": "Готово", "result": {{"results": {{"bilinear": {}}}}}}}"#,
            METHOD
        );
        match normalize(TransportKind::Poll, &raw) {
            NormalizedStatus::Success(outcome) => {
                assert_eq!(outcome.results.len(), 1);
                assert!(outcome.results.contains_key("bilinear"));
            }
            other => panic!("Expected Success, got {other:?}"),
        }
    }

    #[test]
    fn test_success_reads_top_level_results_and_shape() {
        let raw = format!(
            r#"{{"status": "SUCCESS", "result": {{"status": "success", "original_shape": [2, 2]}}, "results": {{"bicubic": {}}}}}"#,
            METHOD
        );
        match normalize(TransportKind::Push, &raw) {
            NormalizedStatus::Success(outcome) => {
                assert!(outcome.results.contains_key("bicubic"));
                assert_eq!(
                    outcome.original_dimensions,
                    Some(Dimensions {
                        width: 2,
                        height: 2
                    })
                );
            }
            other => panic!("Expected Success, got {other:?}"),
        }
    }

    #[test]
    fn test_success_without_results_is_error() {
        let status = normalize(TransportKind::Push, r#"{"status": "SUCCESS"}"#);
        assert_eq!(status.tag(), StatusTag::Error);
        assert_eq!(error_message(&status), "success reported without a result set");

        let status = normalize(
            TransportKind::Poll,
            r#"{"status": "SUCCESS", "result": {"results": {}}}"#,
        );
        assert_eq!(error_message(&status), "success reported with an empty result set");
    }

    #[test]
    fn test_wrapped_worker_error_is_failure() {
        let status = normalize(
            TransportKind::Poll,
            r#"{"status": "SUCCESS", "result": {"status": "error", "error": "image too large"}}"#,
        );
        match status {
            NormalizedStatus::Failure(info) => assert_eq!(info.message, "image too large"),
            other => panic!("Expected Failure, got {other:?}"),
        }
    }

    #[test]
    fn test_progress_clamps_and_defaults_to_zero() {
        assert_eq!(
            normalize(TransportKind::Push, r#"{"status": "PROGRESS", "progress": 42.6}"#),
            NormalizedStatus::Progress(43)
        );
        assert_eq!(
            normalize(TransportKind::Push, r#"{"status": "PROGRESS", "progress": 250}"#),
            NormalizedStatus::Progress(100)
        );
        assert_eq!(
            normalize(TransportKind::Push, r#"{"status": "PROGRESS", "progress": -3}"#),
            NormalizedStatus::Progress(0)
        );
        assert_eq!(
            normalize(TransportKind::Push, r#"{"status": "PROGRESS"}"#),
            NormalizedStatus::Progress(0)
        );
    }

    #[test]
    fn test_pending_with_progress_value_is_progress() {
        assert_eq!(
            normalize(TransportKind::Poll, r#"{"status": "PENDING", "progress": 15}"#),
            NormalizedStatus::Progress(15)
        );
        assert_eq!(
            normalize(TransportKind::Poll, r#"{"status": "PENDING"}"#),
            NormalizedStatus::Pending
        );
        assert_eq!(
            normalize(TransportKind::Poll, r#"{"status": "INITIATED"}"#),
            NormalizedStatus::Initiated
        );
    }

    #[test]
    fn test_failure_carries_remote_message() {
        match normalize(
            TransportKind::Push,
            r#"{"status": "FAILURE", "error": "interpolation failed"}"#,
        ) {
            NormalizedStatus::Failure(info) => assert_eq!(info.message, "interpolation failed"),
            other => panic!("Expected Failure, got {other:?}"),
        }
    }

    #[test]
    fn test_client_error_literal_is_error() {
        let status = normalize(
            TransportKind::Push,
            r#"{"status": "ERROR", "error": "task not found"}"#,
        );
        assert_eq!(error_message(&status), "task not found");
    }

    #[test]
    fn test_malformed_payloads_are_errors_not_failures() {
        for raw in [
            "not json",
            "{}",
            r#"{"status": 7}"#,
            r#"{"status": "EXPLODED"}"#,
            r#"{"status": "PROGRESS", "progress": "half"}"#,
        ] {
            let status = normalize(TransportKind::Poll, raw);
            assert_eq!(status.tag(), StatusTag::Error, "payload {raw}");
            assert_eq!(error_message(&status), MALFORMED_PAYLOAD);
        }
    }

    #[test]
    fn test_success_with_bad_method_is_malformed() {
        let raw = r#"{"status": "SUCCESS", "results": {"bilinear": {"psnr": "n/a"}}}"#;
        assert_eq!(error_message(&normalize(TransportKind::Poll, raw)), MALFORMED_PAYLOAD);
    }

    #[test]
    fn test_success_with_negative_mse_is_malformed() {
        let raw = r#"{"status": "SUCCESS", "results": {"bilinear": {
            "upscaled_shape": [4, 4], "psnr": 31.0, "ssim": 0.9,
            "mse": -2.5, "gradient_diff": 0.1, "processing_time": 0.2
        }}}"#;
        let status = normalize(TransportKind::Poll, raw);
        assert_eq!(status.tag(), StatusTag::Error);
        assert_eq!(error_message(&status), MALFORMED_PAYLOAD);
    }

    #[test]
    fn test_transport_kind_from_str() {
        assert_eq!("poll".parse::<TransportKind>().unwrap(), TransportKind::Poll);
        assert_eq!("WebSocket".parse::<TransportKind>().unwrap(), TransportKind::Push);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_failure_message_from_string_result() {
        let status = normalize(
            TransportKind::Poll,
            r#"{"status": "FAILURE", "result": "ValueError('bad scale')"}"#,
        );
        match status {
            NormalizedStatus::Failure(info) => assert_eq!(info.message, "ValueError('bad scale')"),
            other => panic!("Expected Failure, got {other:?}"),
        }
    }

    #[test]
    fn test_success_with_unreadable_result_is_malformed() {
        let status = normalize(TransportKind::Push, r#"{"status": "SUCCESS", "result": [1, 2]}"#);
        assert_eq!(error_message(&status), MALFORMED_PAYLOAD);
    }
}
