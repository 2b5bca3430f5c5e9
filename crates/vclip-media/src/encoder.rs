//! The seam between the generation service and the two encoder backends.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::watch;

use vclip_models::{ClipRequest, EncoderKind, JobId, MediaMetadata};

use crate::error::MediaResult;
use crate::progress::ProgressReporter;

/// Everything an encoder needs to produce one clip.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub job_id: JobId,
    pub request: ClipRequest,
    /// Probed metadata of `request.source`
    pub metadata: MediaMetadata,
    /// Directory the finished clip is delivered to
    pub output_dir: PathBuf,
}

impl EncodeJob {
    /// Final location of the encoded clip.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}.{}",
            self.job_id,
            self.request.options.format.extension()
        ))
    }
}

/// A finished encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedClip {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
}

/// An encoder backend.
///
/// Implementations must honour the cancellation signal promptly and must not
/// leave partial output behind on error or cancellation.
#[async_trait]
pub trait ClipEncoder: Send + Sync {
    fn kind(&self) -> EncoderKind;

    async fn encode(
        &self,
        job: &EncodeJob,
        progress: &ProgressReporter,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<EncodedClip>;
}
