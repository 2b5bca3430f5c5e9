//! Clip generation requests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

use crate::media::{MediaMetadata, SourceIdentity};
use crate::options::ClipOptions;

/// A request to cut `[start_time, end_time)` out of a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRequest {
    /// Source file path
    pub source: PathBuf,
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds
    pub end_time: f64,
    #[serde(default)]
    pub options: ClipOptions,
}

impl ClipRequest {
    pub fn new(source: impl Into<PathBuf>, start_time: f64, end_time: f64) -> Self {
        Self {
            source: source.into(),
            start_time,
            end_time,
            options: ClipOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ClipOptions) -> Self {
        self.options = options;
        self
    }

    /// Requested duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Check the time range without knowing the source duration.
    pub fn validate_range(&self) -> Result<(), RequestError> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(RequestError::NonFinite);
        }
        if self.start_time < 0.0 {
            return Err(RequestError::NegativeStart(self.start_time));
        }
        if self.start_time >= self.end_time {
            return Err(RequestError::EmptyRange {
                start: self.start_time,
                end: self.end_time,
            });
        }
        Ok(())
    }

    /// Full validation: `0 <= start < end <= duration` and the crop fits the frame.
    pub fn validate(&self, metadata: &MediaMetadata) -> Result<(), RequestError> {
        self.validate_range()?;

        if self.end_time > metadata.duration {
            return Err(RequestError::EndBeyondDuration {
                end: self.end_time,
                duration: metadata.duration,
            });
        }

        if let Some(crop) = self.options.crop {
            if !crop.fits_within(metadata.width, metadata.height) {
                return Err(RequestError::CropOutOfBounds {
                    crop: format!("{}x{}+{}+{}", crop.width, crop.height, crop.x, crop.y),
                    width: metadata.width,
                    height: metadata.height,
                });
            }
        }

        Ok(())
    }

    /// Stable deduplication key: file identity, time range and options.
    pub fn fingerprint(&self, identity: &SourceIdentity) -> String {
        #[derive(Serialize)]
        struct Key<'a> {
            source: &'a SourceIdentity,
            start_time: f64,
            end_time: f64,
            options: &'a ClipOptions,
        }

        let key = Key {
            source: identity,
            start_time: self.start_time,
            end_time: self.end_time,
            options: &self.options,
        };

        // Serializing plain data into a Vec cannot fail
        let bytes = serde_json::to_vec(&key).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

/// Reasons a request is rejected before any encoder runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("Start and end times must be finite numbers")]
    NonFinite,
    #[error("Start time cannot be negative: {0}")]
    NegativeStart(f64),
    #[error("Invalid time range: start ({start:.3}s) must be before end ({end:.3}s)")]
    EmptyRange { start: f64, end: f64 },
    #[error("End time {end:.3}s exceeds source duration {duration:.3}s")]
    EndBeyondDuration { end: f64, duration: f64 },
    #[error("Crop {crop} does not fit a {width}x{height} frame")]
    CropOutOfBounds { crop: String, width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CropRect, QualityTier};

    fn metadata() -> MediaMetadata {
        MediaMetadata {
            duration: 60.0,
            width: 1920,
            height: 1080,
            has_audio: true,
            fps: 30.0,
            codec: "h264".to_string(),
            size_bytes: 1_000,
        }
    }

    #[test]
    fn test_valid_request() {
        let request = ClipRequest::new("in.mp4", 0.0, 60.0);
        assert!(request.validate(&metadata()).is_ok());
        assert!((request.duration() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let m = metadata();
        assert!(matches!(
            ClipRequest::new("in.mp4", 10.0, 10.0).validate(&m),
            Err(RequestError::EmptyRange { .. })
        ));
        assert!(matches!(
            ClipRequest::new("in.mp4", -1.0, 5.0).validate(&m),
            Err(RequestError::NegativeStart(_))
        ));
        assert!(matches!(
            ClipRequest::new("in.mp4", 50.0, 60.5).validate(&m),
            Err(RequestError::EndBeyondDuration { .. })
        ));
        assert!(matches!(
            ClipRequest::new("in.mp4", f64::NAN, 5.0).validate(&m),
            Err(RequestError::NonFinite)
        ));
    }

    #[test]
    fn test_rejects_crop_outside_frame() {
        let request = ClipRequest::new("in.mp4", 0.0, 5.0).with_options(ClipOptions {
            crop: Some(CropRect::new(1500, 0, 608, 1080)),
            ..Default::default()
        });
        assert!(matches!(
            request.validate(&metadata()),
            Err(RequestError::CropOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_fingerprint_stability() {
        let identity = SourceIdentity::new("in.mp4", 1_000, Some(42));
        let a = ClipRequest::new("in.mp4", 1.0, 5.0);
        let b = ClipRequest::new("in.mp4", 1.0, 5.0);
        assert_eq!(a.fingerprint(&identity), b.fingerprint(&identity));
        assert_eq!(a.fingerprint(&identity).len(), 64);

        let other_quality = a.clone().with_options(ClipOptions {
            quality: QualityTier::High,
            ..Default::default()
        });
        assert_ne!(a.fingerprint(&identity), other_quality.fingerprint(&identity));

        let modified = SourceIdentity::new("in.mp4", 1_000, Some(43));
        assert_ne!(a.fingerprint(&identity), a.fingerprint(&modified));
    }
}
