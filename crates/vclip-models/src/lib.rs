//! Shared data models for viral clip generation and multi-model analysis.
//!
//! This crate provides Serde-serializable types for:
//! - Clip requests, output options and request fingerprints
//! - Generation jobs and results
//! - Encoding presets shared by both encoder backends
//! - Provider clips, similarities and aggregated consensus results

pub mod analysis;
pub mod batch;
pub mod clip;
pub mod encoding;
pub mod job;
pub mod media;
pub mod options;
pub mod request;

// Re-export common types
pub use analysis::{
    AggregatedClip, AiProvider, AnalysisSettings, ClipSimilarity, ClipVariation, ExtractedFrame,
    MultiModelAnalysis, ProviderClip, ProviderParseError, ProviderStatus,
};
pub use batch::{BatchClip, BatchClipOutcome, BatchReport};
pub use clip::{Clip, ViralScoreBreakdown};
pub use encoding::{BitrateTarget, EncodingPreset, RateControl};
pub use job::{EncoderKind, GenerationJob, GenerationResult, JobId, JobStatus};
pub use media::{MediaMetadata, SourceIdentity};
pub use options::{ClipOptions, CropRect, OptionParseError, OutputFormat, QualityTier, TargetAspect};
pub use request::{ClipRequest, RequestError};
