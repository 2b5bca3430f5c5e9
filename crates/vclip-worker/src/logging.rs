//! Structured logging for clip jobs.

use tracing::{error, info, info_span, warn, Span};
use vclip_media::MediaError;
use vclip_models::{ClipRequest, EncoderKind, GenerationResult, JobId, MediaMetadata};

use crate::generation::{FailureKind, JobFailure};

/// Emits the lifecycle events of one clip job with consistent
/// `job_id`/`fingerprint` fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    fingerprint: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, fingerprint: &str) -> Self {
        Self {
            job_id: job_id.clone(),
            fingerprint: fingerprint.to_string(),
        }
    }

    /// Span carrying the job fields, for instrumenting the whole job future.
    pub fn span(&self) -> Span {
        info_span!(
            "clip_job",
            job_id = %self.job_id,
            fingerprint = %self.fingerprint
        )
    }

    pub fn probed(&self, metadata: &MediaMetadata) {
        info!(
            job_id = %self.job_id,
            duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            has_audio = metadata.has_audio,
            "Source probed"
        );
    }

    pub fn started(&self, request: &ClipRequest, encoder: EncoderKind) {
        info!(
            job_id = %self.job_id,
            encoder = %encoder,
            source = %request.source.display(),
            start_time = request.start_time,
            end_time = request.end_time,
            format = %request.options.format,
            "Clip job started"
        );
    }

    pub fn fallback_retry(&self, error: &MediaError) {
        warn!(
            job_id = %self.job_id,
            error = %error,
            "Fast path failed, retrying on fallback engine"
        );
    }

    pub fn completed(&self, result: &GenerationResult) {
        info!(
            job_id = %self.job_id,
            encoder = ?result.encoder,
            size_bytes = result.size_bytes,
            duration_seconds = result.duration_seconds,
            "Clip job completed"
        );
    }

    pub fn failed(&self, failure: &JobFailure) {
        match failure.kind {
            FailureKind::Cancelled => warn!(job_id = %self.job_id, "Clip job cancelled"),
            kind => error!(
                job_id = %self.job_id,
                kind = ?kind,
                error = %failure.message,
                "Clip job failed"
            ),
        }
    }
}
