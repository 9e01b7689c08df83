//! Submission validation
//!
//! Checks applied before an image is sent to the service. The tracker never
//! re-validates; once a job id exists these rules have already held.

use std::fmt;
use thiserror::Error;

/// Largest image accepted for upload (5 MiB)
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Scale factors must be strictly greater than this
pub const MIN_SCALE_FACTOR: f64 = 1.0;

/// Largest accepted scale factor
pub const MAX_SCALE_FACTOR: f64 = 8.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("image is empty")]
    EmptyImage,

    #[error("unsupported image format (expected PNG, JPEG or WEBP)")]
    UnsupportedFormat,

    #[error("image is too large: {size} bytes (max {max})")]
    ImageTooLarge { size: usize, max: usize },

    #[error("scale factor must be greater than 1 and at most 8, got {0}")]
    ScaleFactorOutOfRange(f64),
}

/// Image formats the service accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// Detects the format from the file signature
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mime_type())
    }
}

/// Validates an image and returns its detected format
pub fn validate_image(bytes: &[u8]) -> Result<ImageFormat, ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptyImage);
    }

    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ValidationError::ImageTooLarge {
            size: bytes.len(),
            max: MAX_IMAGE_BYTES,
        });
    }

    ImageFormat::sniff(bytes).ok_or(ValidationError::UnsupportedFormat)
}

/// Validates a scale factor against `(1.0, 8.0]`
pub fn validate_scale_factor(scale_factor: f64) -> Result<(), ValidationError> {
    if !scale_factor.is_finite()
        || scale_factor <= MIN_SCALE_FACTOR
        || scale_factor > MAX_SCALE_FACTOR
    {
        return Err(ValidationError::ScaleFactorOutOfRange(scale_factor));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_sniff_formats() {
        assert_eq!(ImageFormat::sniff(&PNG_HEADER), Some(ImageFormat::Png));
        assert_eq!(
            ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::sniff(b"RIFF\x10\x00\x00\x00WEBPVP8 "),
            Some(ImageFormat::Webp)
        );
        assert_eq!(ImageFormat::sniff(b"GIF89a"), None);
    }

    #[test]
    fn test_validate_image() {
        assert_eq!(validate_image(&PNG_HEADER), Ok(ImageFormat::Png));
        assert_eq!(validate_image(&[]), Err(ValidationError::EmptyImage));
        assert_eq!(
            validate_image(b"GIF89a"),
            Err(ValidationError::UnsupportedFormat)
        );

        let mut big = PNG_HEADER.to_vec();
        big.resize(MAX_IMAGE_BYTES + 1, 0);
        assert!(matches!(
            validate_image(&big),
            Err(ValidationError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_scale_factor_bounds() {
        assert!(validate_scale_factor(1.0).is_err());
        assert!(validate_scale_factor(1.01).is_ok());
        assert!(validate_scale_factor(8.0).is_ok());
        assert!(validate_scale_factor(8.5).is_err());
        assert!(validate_scale_factor(f64::NAN).is_err());
    }
}
