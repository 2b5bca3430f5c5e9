//! Output options for a generated clip.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// MP4 container, H.264 video
    #[default]
    Mp4,
    /// WebM container, VP9 video
    Webm,
}

impl OutputFormat {
    pub const ALL: &'static [OutputFormat] = &[OutputFormat::Mp4, OutputFormat::Webm];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
        }
    }

    /// File extension for this container.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// MIME type of the encoded payload.
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Webm => "video/webm",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = OptionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp4" => Ok(OutputFormat::Mp4),
            "webm" => Ok(OutputFormat::Webm),
            _ => Err(OptionParseError::UnknownFormat(s.to_string())),
        }
    }
}

/// Quality tier, trading encode speed against output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    High,
    #[default]
    Medium,
    Low,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = OptionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(QualityTier::High),
            "medium" => Ok(QualityTier::Medium),
            "low" => Ok(QualityTier::Low),
            _ => Err(OptionParseError::UnknownQuality(s.to_string())),
        }
    }
}

/// Target aspect ratio of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetAspect {
    /// Keep the source aspect ratio
    #[default]
    Original,
    /// 16:9 landscape
    Landscape,
    /// 9:16 portrait (TikTok/Reels/Shorts)
    Portrait,
    /// 1:1 square
    Square,
}

impl TargetAspect {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetAspect::Original => "original",
            TargetAspect::Landscape => "16:9",
            TargetAspect::Portrait => "9:16",
            TargetAspect::Square => "1:1",
        }
    }

    /// Fixed canvas size for named ratios, `None` for `Original`.
    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        match self {
            TargetAspect::Original => None,
            TargetAspect::Landscape => Some((1280, 720)),
            TargetAspect::Portrait => Some((720, 1280)),
            TargetAspect::Square => Some((720, 720)),
        }
    }
}

impl fmt::Display for TargetAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TargetAspect {
    type Err = OptionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "original" => Ok(TargetAspect::Original),
            "16:9" | "landscape" => Ok(TargetAspect::Landscape),
            "9:16" | "portrait" => Ok(TargetAspect::Portrait),
            "1:1" | "square" => Ok(TargetAspect::Square),
            _ => Err(OptionParseError::UnknownAspect(s.to_string())),
        }
    }
}

/// Crop rectangle in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check that the rectangle is non-empty and lies inside a frame of the given size.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.saturating_add(self.width) <= frame_width
            && self.y.saturating_add(self.height) <= frame_height
    }
}

impl FromStr for CropRect {
    type Err = OptionParseError;

    /// Parses `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(OptionParseError::InvalidCrop(s.to_string()));
        }
        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| OptionParseError::InvalidCrop(s.to_string()))?;
        }
        Ok(CropRect::new(values[0], values[1], values[2], values[3]))
    }
}

/// Options controlling how a clip is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub struct ClipOptions {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub quality: QualityTier,
    #[serde(default)]
    pub aspect_ratio: TargetAspect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRect>,
}

#[derive(Debug, Error)]
pub enum OptionParseError {
    #[error("Unknown output format: {0}")]
    UnknownFormat(String),
    #[error("Unknown quality tier: {0}")]
    UnknownQuality(String),
    #[error("Unknown aspect ratio: {0}, expected original, 16:9, 9:16 or 1:1")]
    UnknownAspect(String),
    #[error("Invalid crop rectangle: {0}, expected 'x,y,width,height'")]
    InvalidCrop(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_parse() {
        assert_eq!("9:16".parse::<TargetAspect>().unwrap(), TargetAspect::Portrait);
        assert_eq!("SQUARE".parse::<TargetAspect>().unwrap(), TargetAspect::Square);
        assert!("4:3".parse::<TargetAspect>().is_err());
    }

    #[test]
    fn test_canvas_sizes() {
        assert_eq!(TargetAspect::Landscape.canvas_size(), Some((1280, 720)));
        assert_eq!(TargetAspect::Portrait.canvas_size(), Some((720, 1280)));
        assert_eq!(TargetAspect::Square.canvas_size(), Some((720, 720)));
        assert_eq!(TargetAspect::Original.canvas_size(), None);
    }

    #[test]
    fn test_crop_parse_and_bounds() {
        let crop: CropRect = "100, 0, 608, 1080".parse().unwrap();
        assert_eq!(crop, CropRect::new(100, 0, 608, 1080));
        assert!(crop.fits_within(1920, 1080));
        assert!(!crop.fits_within(640, 1080));
        assert!(!CropRect::new(0, 0, 0, 10).fits_within(1920, 1080));
        assert!("1,2,3".parse::<CropRect>().is_err());
    }

    #[test]
    fn test_options_serde_defaults() {
        let options: ClipOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.format, OutputFormat::Mp4);
        assert_eq!(options.quality, QualityTier::Medium);
        assert_eq!(options.aspect_ratio, TargetAspect::Original);
        assert!(options.crop.is_none());
    }
}
