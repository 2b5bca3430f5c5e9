//! Generation jobs and their results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::options::{OutputFormat, QualityTier, TargetAspect};
use crate::request::ClipRequest;

/// Unique identifier for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which backend produced (or attempted) an encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    /// In-process native codec session
    FastPath,
    /// Sandboxed FFmpeg engine
    Fallback,
}

impl EncoderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderKind::FastPath => "fast_path",
            EncoderKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A clip request tracked through generation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationJob {
    pub id: JobId,
    pub request: ClipRequest,
    pub status: JobStatus,
    /// Progress percentage, 0-100
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder: Option<EncoderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationJob {
    pub fn new(id: JobId, request: ClipRequest) -> Self {
        Self {
            id,
            request,
            status: JobStatus::Pending,
            progress: 0,
            encoder: None,
            error: None,
        }
    }

    /// Move to `processing` on the given encoder.
    pub fn start(&mut self, encoder: EncoderKind) {
        self.status = JobStatus::Processing;
        self.encoder = Some(encoder);
    }

    /// Record progress; never moves backwards within one job.
    pub fn set_progress(&mut self, percent: u8) {
        self.progress = self.progress.max(percent.min(100));
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
    }
}

/// Outcome of a generation job returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationResult {
    pub id: JobId,
    pub status: JobStatus,
    pub format: OutputFormat,
    pub quality: QualityTier,
    pub aspect_ratio: TargetAspect,
    pub size_bytes: u64,
    pub duration_seconds: f64,
    /// Path of the encoded output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder: Option<EncoderKind>,
}

impl GenerationResult {
    /// Successful result for an encoded payload.
    pub fn completed(
        id: JobId,
        request: &ClipRequest,
        payload: PathBuf,
        size_bytes: u64,
        duration_seconds: f64,
        encoder: EncoderKind,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Completed,
            format: request.options.format,
            quality: request.options.quality,
            aspect_ratio: request.options.aspect_ratio,
            size_bytes,
            duration_seconds,
            payload: Some(payload),
            error: None,
            encoder: Some(encoder),
        }
    }

    /// Failed result carrying the error message.
    pub fn failed(id: JobId, request: &ClipRequest, error: impl Into<String>) -> Self {
        Self {
            id,
            status: JobStatus::Failed,
            format: request.options.format,
            quality: request.options.quality,
            aspect_ratio: request.options.aspect_ratio,
            size_bytes: 0,
            duration_seconds: 0.0,
            payload: None,
            error: Some(error.into()),
            encoder: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
