//! Per-provider clip candidates.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Five-field 0-100 viral scoring record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub struct ViralScoreBreakdown {
    pub overall: u8,
    pub engagement: u8,
    pub shareability: u8,
    pub retention: u8,
    pub trend: u8,
}

impl ViralScoreBreakdown {
    pub fn new(overall: u8, engagement: u8, shareability: u8, retention: u8, trend: u8) -> Self {
        Self {
            overall,
            engagement,
            shareability,
            retention,
            trend,
        }
    }

    /// Every field clamped to 0-100.
    pub fn clamped(self) -> Self {
        Self {
            overall: self.overall.min(100),
            engagement: self.engagement.min(100),
            shareability: self.shareability.min(100),
            retention: self.retention.min(100),
            trend: self.trend.min(100),
        }
    }

    /// Fields in a fixed order: overall, engagement, shareability, retention, trend.
    pub fn fields(&self) -> [u8; 5] {
        [
            self.overall,
            self.engagement,
            self.shareability,
            self.retention,
            self.trend,
        ]
    }

    pub fn from_fields(fields: [u8; 5]) -> Self {
        Self::new(fields[0], fields[1], fields[2], fields[3], fields[4])
    }
}

/// A candidate clip proposed by one AI provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    pub id: String,
    pub title: String,
    /// Why this moment is likely to perform
    pub reason: String,
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds
    pub end_time: f64,
    pub viral_score: ViralScoreBreakdown,
    #[serde(default)]
    pub score_explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_analysis: Option<String>,
}

impl Clip {
    /// Clip duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// True when the time range is finite, non-negative and non-empty.
    pub fn has_valid_range(&self) -> bool {
        self.start_time.is_finite()
            && self.end_time.is_finite()
            && self.start_time >= 0.0
            && self.end_time > self.start_time
    }
}
