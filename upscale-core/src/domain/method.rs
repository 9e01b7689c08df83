//! Per-method result types

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Results of every method evaluated for one job, keyed by method name.
///
/// Iteration order is the order the service reported the methods in, which
/// is also the tie-break order used by the reconciler.
pub type ResultSet = IndexMap<String, MethodResult>;

/// One algorithm's outcome for a job
///
/// Metrics outside their natural range are rejected on decode: `psnr`, `mse`,
/// `gradient_diff` and `processing_time` are non-negative, `ssim` lies in
/// `[-1, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMethodResult")]
pub struct MethodResult {
    pub psnr: Psnr,
    pub ssim: f64,
    pub mse: f64,
    pub gradient_diff: f64,
    #[serde(rename = "processing_time")]
    pub processing_time_seconds: f64,
    #[serde(rename = "upscaled_shape")]
    pub output_dimensions: Dimensions,
    #[serde(flatten)]
    pub artifacts: Artifacts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Wire form of [`MethodResult`] before range checks
#[derive(Deserialize)]
struct RawMethodResult {
    psnr: Psnr,
    ssim: f64,
    mse: f64,
    gradient_diff: f64,
    processing_time: f64,
    upscaled_shape: Dimensions,
    #[serde(flatten)]
    artifacts: Artifacts,
    #[serde(default)]
    message: Option<String>,
}

impl TryFrom<RawMethodResult> for MethodResult {
    type Error = String;

    fn try_from(raw: RawMethodResult) -> Result<Self, Self::Error> {
        if let Psnr::Finite(value) = raw.psnr {
            non_negative("psnr", value)?;
        }
        if !(-1.0..=1.0).contains(&raw.ssim) {
            return Err(format!("ssim must lie in [-1, 1], got {}", raw.ssim));
        }
        non_negative("mse", raw.mse)?;
        non_negative("gradient_diff", raw.gradient_diff)?;
        non_negative("processing_time", raw.processing_time)?;

        Ok(Self {
            psnr: raw.psnr,
            ssim: raw.ssim,
            mse: raw.mse,
            gradient_diff: raw.gradient_diff,
            processing_time_seconds: raw.processing_time,
            output_dimensions: raw.upscaled_shape,
            artifacts: raw.artifacts,
            message: raw.message,
        })
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(format!("{} must be a non-negative number, got {}", name, value))
    }
}

/// Compares two metric values, treating `0.0` and `-0.0` as equal
///
/// NaN cannot come off the wire; `total_cmp` still gives it a place.
pub fn compare_metric(a: f64, b: f64) -> Ordering {
    (a + 0.0)
        .partial_cmp(&(b + 0.0))
        .unwrap_or_else(|| a.total_cmp(&b))
}

/// Opaque image payloads produced by a method.
///
/// These are passed through untouched; nothing in the client looks inside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(
        rename = "upscaled_image_base64",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub upscaled_image: Option<String>,
    #[serde(
        rename = "diff_image_base64",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub difference_image: Option<String>,
    #[serde(rename = "hist_base64", default, skip_serializing_if = "Option::is_none")]
    pub error_histogram: Option<String>,
}

/// Peak signal-to-noise ratio.
///
/// The service reports pixel-identical reconstructions as the string
/// `"infinity"`. [`Psnr::Infinite`] orders above every finite value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPsnr", into = "RawPsnr")]
pub enum Psnr {
    Finite(f64),
    Infinite,
}

impl Psnr {
    /// Returns true for the infinite sentinel
    pub fn is_infinite(&self) -> bool {
        matches!(self, Psnr::Infinite)
    }

    /// Total order with the sentinel above every finite value
    pub fn total_cmp(&self, other: &Psnr) -> Ordering {
        match (self, other) {
            (Psnr::Infinite, Psnr::Infinite) => Ordering::Equal,
            (Psnr::Infinite, Psnr::Finite(_)) => Ordering::Greater,
            (Psnr::Finite(_), Psnr::Infinite) => Ordering::Less,
            (Psnr::Finite(a), Psnr::Finite(b)) => compare_metric(*a, *b),
        }
    }
}

impl PartialOrd for Psnr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.total_cmp(other))
    }
}

impl fmt::Display for Psnr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Psnr::Finite(value) => write!(f, "{:.2}", value),
            Psnr::Infinite => write!(f, "∞"),
        }
    }
}

/// Wire form of [`Psnr`]: a JSON number or an "infinity" string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawPsnr {
    Number(f64),
    Text(String),
}

impl TryFrom<RawPsnr> for Psnr {
    type Error = String;

    fn try_from(raw: RawPsnr) -> Result<Self, Self::Error> {
        match raw {
            RawPsnr::Number(value) if value.is_infinite() && value > 0.0 => Ok(Psnr::Infinite),
            RawPsnr::Number(value) if value.is_finite() => Ok(Psnr::Finite(value)),
            RawPsnr::Number(value) => Err(format!("invalid psnr value {}", value)),
            RawPsnr::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "infinity" | "inf" | "+inf" | "∞" => Ok(Psnr::Infinite),
                _ => Err(format!("invalid psnr value {:?}", text)),
            },
        }
    }
}

impl From<Psnr> for RawPsnr {
    fn from(psnr: Psnr) -> Self {
        match psnr {
            Psnr::Finite(value) => RawPsnr::Number(value),
            Psnr::Infinite => RawPsnr::Text("infinity".to_string()),
        }
    }
}

/// Image dimensions in pixels, `[width, height]` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl TryFrom<(u32, u32)> for Dimensions {
    type Error = String;

    fn try_from((width, height): (u32, u32)) -> Result<Self, Self::Error> {
        if width == 0 || height == 0 {
            return Err(format!("dimensions must be positive, got {}x{}", width, height));
        }
        Ok(Self { width, height })
    }
}

impl From<Dimensions> for (u32, u32) {
    fn from(dims: Dimensions) -> Self {
        (dims.width, dims.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_psnr_parses_number_and_sentinel() {
        let finite: Psnr = serde_json::from_str("30.5").unwrap();
        assert_eq!(finite, Psnr::Finite(30.5));

        for text in ["\"infinity\"", "\"Infinity\"", "\"inf\""] {
            let psnr: Psnr = serde_json::from_str(text).unwrap();
            assert!(psnr.is_infinite(), "{} should be the sentinel", text);
        }

        assert!(serde_json::from_str::<Psnr>("\"n/a\"").is_err());
    }

    #[test]
    fn test_psnr_sentinel_orders_above_finite() {
        assert!(Psnr::Infinite > Psnr::Finite(1.0e12));
        assert_eq!(Psnr::Infinite.total_cmp(&Psnr::Infinite), Ordering::Equal);
        assert!(Psnr::Finite(32.1) > Psnr::Finite(30.5));
    }

    #[test]
    fn test_signed_zeros_compare_equal() {
        assert_eq!(compare_metric(0.0, -0.0), Ordering::Equal);
        assert_eq!(compare_metric(-0.0, 0.0), Ordering::Equal);
        assert_eq!(Psnr::Finite(0.0).total_cmp(&Psnr::Finite(-0.0)), Ordering::Equal);
        assert_eq!(compare_metric(1.0, 2.0), Ordering::Less);
    }

    #[test]
    fn test_psnr_serializes_sentinel_as_string() {
        assert_eq!(serde_json::to_string(&Psnr::Infinite).unwrap(), "\"infinity\"");
        assert_eq!(Psnr::Infinite.to_string(), "∞");
        assert_eq!(Psnr::Finite(30.456).to_string(), "30.46");
    }

    #[test]
    fn test_method_result_from_wire() {
        let json = r#"{
            "upscaled_image_base64": "data:image/png;base64,AAAA",
            "diff_image_base64": "data:image/png;base64,BBBB",
            "hist_base64": "data:image/png;base64,CCCC",
            "upscaled_shape": [640, 480],
            "psnr": "infinity",
            "ssim": 1.0,
            "mse": 0.0,
            "gradient_diff": 0.0,
            "processing_time": 0.35,
            "message": "done"
        }"#;

        let result: MethodResult = serde_json::from_str(json).unwrap();
        assert!(result.psnr.is_infinite());
        assert_eq!(result.output_dimensions, Dimensions { width: 640, height: 480 });
        assert_eq!(result.processing_time_seconds, 0.35);
        assert_eq!(
            result.artifacts.error_histogram.as_deref(),
            Some("data:image/png;base64,CCCC")
        );
    }

    #[test]
    fn test_method_result_requires_metrics() {
        let json = r#"{"upscaled_shape": [640, 480], "psnr": 30.0, "ssim": 0.9}"#;
        assert!(serde_json::from_str::<MethodResult>(json).is_err());
    }

    #[test]
    fn test_method_result_rejects_out_of_range_metrics() {
        let with = |field: &str, value: serde_json::Value| {
            let mut body = json!({
                "upscaled_shape": [4, 4],
                "psnr": 30.0,
                "ssim": 0.9,
                "mse": 1.5,
                "gradient_diff": 0.2,
                "processing_time": 0.1
            });
            body[field] = value;
            serde_json::from_value::<MethodResult>(body)
        };

        assert!(with("mse", json!(1.5)).is_ok());
        assert!(with("ssim", json!(-1.0)).is_ok());
        assert!(with("mse", json!(-0.0)).is_ok());

        for (field, value) in [
            ("psnr", json!(-3.0)),
            ("ssim", json!(1.2)),
            ("ssim", json!(-1.5)),
            ("mse", json!(-0.5)),
            ("gradient_diff", json!(-1.0)),
            ("processing_time", json!(-0.01)),
        ] {
            let rejected = with(field, value.clone());
            assert!(rejected.is_err(), "{} = {} should be rejected", field, value);
        }
    }

    #[test]
    fn test_dimensions_reject_zero() {
        assert!(serde_json::from_str::<Dimensions>("[0, 480]").is_err());
        let dims: Dimensions = serde_json::from_str("[2, 3]").unwrap();
        assert_eq!(dims.to_string(), "2 x 3");
    }

    #[test]
    fn test_result_set_preserves_server_order() {
        let json = r#"{
            "nearest": {"upscaled_shape": [2, 2], "psnr": 1.0, "ssim": 0.1, "mse": 1.0, "gradient_diff": 1.0, "processing_time": 1.0},
            "bicubic": {"upscaled_shape": [2, 2], "psnr": 2.0, "ssim": 0.2, "mse": 1.0, "gradient_diff": 1.0, "processing_time": 1.0},
            "area": {"upscaled_shape": [2, 2], "psnr": 3.0, "ssim": 0.3, "mse": 1.0, "gradient_diff": 1.0, "processing_time": 1.0}
        }"#;

        let set: ResultSet = serde_json::from_str(json).unwrap();
        let names: Vec<&str> = set.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["nearest", "bicubic", "area"]);
    }
}
