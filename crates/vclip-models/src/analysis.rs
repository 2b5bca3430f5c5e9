//! Multi-model analysis data models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::clip::{Clip, ViralScoreBreakdown};

/// AI providers that can analyze a video.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AiProvider {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Claude,
    Grok,
}

impl AiProvider {
    pub const ALL: &'static [AiProvider] = &[
        AiProvider::Gemini,
        AiProvider::OpenAi,
        AiProvider::Claude,
        AiProvider::Grok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::Gemini => "gemini",
            AiProvider::OpenAi => "openai",
            AiProvider::Claude => "claude",
            AiProvider::Grok => "grok",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            AiProvider::Gemini => "Gemini",
            AiProvider::OpenAi => "OpenAI",
            AiProvider::Claude => "Claude",
            AiProvider::Grok => "Grok",
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AiProvider {
    type Err = ProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(AiProvider::Gemini),
            "openai" | "gpt" => Ok(AiProvider::OpenAi),
            "claude" | "anthropic" => Ok(AiProvider::Claude),
            "grok" | "xai" => Ok(AiProvider::Grok),
            _ => Err(ProviderParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown AI provider: {0}")]
pub struct ProviderParseError(pub String);

/// A sampled frame handed to providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedFrame {
    /// Timestamp in the source, seconds
    pub timestamp: f64,
    /// Base64-encoded image bytes
    pub image_base64: String,
    pub mime_type: String,
}

/// User-tunable analysis settings passed to every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisSettings {
    /// Maximum number of clips each provider should propose
    #[serde(default = "default_max_clips")]
    pub max_clips: usize,
    #[serde(default = "default_min_clip_seconds")]
    pub min_clip_seconds: f64,
    #[serde(default = "default_max_clip_seconds")]
    pub max_clip_seconds: f64,
    /// Platform the clips are intended for (e.g. "tiktok")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

fn default_max_clips() -> usize {
    4
}
fn default_min_clip_seconds() -> f64 {
    10.0
}
fn default_max_clip_seconds() -> f64 {
    60.0
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_clips: default_max_clips(),
            min_clip_seconds: default_min_clip_seconds(),
            max_clip_seconds: default_max_clip_seconds(),
            target_platform: None,
            custom_prompt: None,
        }
    }
}

/// A clip together with the provider that proposed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderClip {
    pub provider: AiProvider,
    pub clip: Clip,
}

impl ProviderClip {
    pub fn new(provider: AiProvider, clip: Clip) -> Self {
        Self { provider, clip }
    }

    /// Identity of this clip within one analysis run.
    pub fn key(&self) -> (AiProvider, &str) {
        (self.provider, self.clip.id.as_str())
    }
}

/// Two overlapping clips from different providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipSimilarity {
    pub first: ProviderClip,
    pub second: ProviderClip,
    /// Overlap relative to the shorter clip, 0-100
    pub overlap_percent: f64,
}

/// One provider's own take on an aggregated clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipVariation {
    pub title: String,
    pub reason: String,
    pub viral_score: ViralScoreBreakdown,
}

/// Merged representation of one or more overlapping clip proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregatedClip {
    pub id: String,
    pub title: String,
    pub reason: String,
    pub start_time: f64,
    pub end_time: f64,
    pub aggregated_viral_score: ViralScoreBreakdown,
    pub score_explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_analysis: Option<String>,
    pub recommended_by: BTreeSet<AiProvider>,
    /// Share of invoked providers that proposed this moment, 0-100
    pub confidence_score: f64,
    pub variations: BTreeMap<AiProvider, ClipVariation>,
}

impl AggregatedClip {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Result of one multi-model analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MultiModelAnalysis {
    /// Providers that were invoked
    pub providers: Vec<AiProvider>,
    /// Aggregated clips, best first
    pub aggregated_clips: Vec<AggregatedClip>,
    /// Raw clips per provider that succeeded
    pub provider_results: BTreeMap<AiProvider, Vec<Clip>>,
    /// Failure reason per provider that failed
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provider_errors: BTreeMap<AiProvider, String>,
    /// Whole-run agreement, 0-100
    pub consensus_score: f64,
}

/// Per-provider lifecycle event emitted during analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Started,
    Completed,
    Failed,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Started => "started",
            ProviderStatus::Completed => "completed",
            ProviderStatus::Failed => "failed",
        }
    }
}
