//! Encoding parameters shared by both encoder backends.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::options::{ClipOptions, OutputFormat, QualityTier};

/// Frame rate the fast path decodes and encodes at.
pub const FAST_PATH_FPS: u32 = 30;
/// Every Nth encoded frame is forced to a keyframe.
pub const KEYFRAME_INTERVAL: u64 = 30;
/// Longest edge of an `Original`-aspect output.
pub const MAX_OUTPUT_DIMENSION: u32 = 1280;
/// Default audio bitrate for re-encoded audio
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Rate control mode for bitrate-driven encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RateControl {
    Variable,
    Constant,
}

/// CRF/preset pair used by the fallback engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingPreset {
    pub video_codec: &'static str,
    pub audio_codec: &'static str,
    pub crf: u8,
    /// x264 preset name, or the libvpx `-cpu-used` value for WebM
    pub preset: &'static str,
}

impl EncodingPreset {
    /// Preset for a quality tier and container.
    pub fn for_output(quality: QualityTier, format: OutputFormat) -> Self {
        match format {
            OutputFormat::Mp4 => {
                let (crf, preset) = match quality {
                    QualityTier::High => (20, "medium"),
                    QualityTier::Medium => (23, "fast"),
                    QualityTier::Low => (28, "ultrafast"),
                };
                Self {
                    video_codec: "libx264",
                    audio_codec: "aac",
                    crf,
                    preset,
                }
            }
            // VP9's CRF scale is wider than x264's
            OutputFormat::Webm => {
                let (crf, cpu_used) = match quality {
                    QualityTier::High => (31, "2"),
                    QualityTier::Medium => (35, "4"),
                    QualityTier::Low => (42, "8"),
                };
                Self {
                    video_codec: "libvpx-vp9",
                    audio_codec: "libopus",
                    crf,
                    preset: cpu_used,
                }
            }
        }
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self, format: OutputFormat) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.video_codec.to_string(),
            "-crf".to_string(),
            self.crf.to_string(),
        ];

        match format {
            OutputFormat::Mp4 => {
                args.extend(["-preset".to_string(), self.preset.to_string()]);
                args.extend(["-movflags".to_string(), "+faststart".to_string()]);
            }
            OutputFormat::Webm => {
                args.extend(["-b:v".to_string(), "0".to_string()]);
                args.extend(["-cpu-used".to_string(), self.preset.to_string()]);
            }
        }

        args.extend([
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            self.audio_codec.to_string(),
            "-b:a".to_string(),
            DEFAULT_AUDIO_BITRATE.to_string(),
        ]);

        args
    }
}

/// Bitrate settings for the fast path's native encoder session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BitrateTarget {
    /// Target bits per second
    pub bits_per_second: u64,
    pub rate_control: RateControl,
}

impl BitrateTarget {
    /// Bitrate ceiling per tier in bits/second.
    pub fn ceiling(quality: QualityTier) -> u64 {
        match quality {
            QualityTier::High => 8_000_000,
            QualityTier::Medium => 4_000_000,
            QualityTier::Low => 2_000_000,
        }
    }

    /// Bits per output pixel per second.
    pub fn quality_factor(quality: QualityTier) -> f64 {
        match quality {
            QualityTier::High => 6.0,
            QualityTier::Medium => 3.5,
            QualityTier::Low => 2.0,
        }
    }

    /// `width * height * factor`, capped at the tier ceiling.
    pub fn for_output(width: u32, height: u32, quality: QualityTier) -> Self {
        let raw = (width as f64 * height as f64 * Self::quality_factor(quality)).round() as u64;
        let rate_control = match quality {
            QualityTier::High | QualityTier::Medium => RateControl::Variable,
            QualityTier::Low => RateControl::Constant,
        };
        Self {
            bits_per_second: raw.min(Self::ceiling(quality)),
            rate_control,
        }
    }
}

/// Whether frame `index` (0-based) is encoded as a keyframe.
pub fn is_keyframe(index: u64) -> bool {
    index % KEYFRAME_INTERVAL == 0
}

/// Output frame size for a clip.
///
/// Crop rectangle wins, then the fixed canvas for a named aspect ratio,
/// then the source scaled down to fit [`MAX_OUTPUT_DIMENSION`]. Dimensions
/// are rounded down to even values for 4:2:0 chroma subsampling.
pub fn output_dimensions(options: &ClipOptions, source_width: u32, source_height: u32) -> (u32, u32) {
    if let Some(crop) = options.crop {
        return (even(crop.width), even(crop.height));
    }

    if let Some(size) = options.aspect_ratio.canvas_size() {
        return size;
    }

    let longest = source_width.max(source_height);
    if longest <= MAX_OUTPUT_DIMENSION || longest == 0 {
        return (even(source_width), even(source_height));
    }

    let scale = MAX_OUTPUT_DIMENSION as f64 / longest as f64;
    let width = (source_width as f64 * scale).round() as u32;
    let height = (source_height as f64 * scale).round() as u32;
    (even(width), even(height))
}

fn even(value: u32) -> u32 {
    (value & !1).max(2)
}
