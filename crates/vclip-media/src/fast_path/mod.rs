//! In-process fast path encoder.
//!
//! Decodes the source with native codec primitives, pushes frames through a
//! filter graph that applies the clip geometry at a constant 30 fps, and
//! encodes with a keyframe every [`KEYFRAME_INTERVAL`] frames. Only available
//! when the crate is built with the `native-encoder` feature and the running
//! process has an encoder for the requested container.

#[cfg(feature = "native-encoder")]
pub(crate) mod native;

use async_trait::async_trait;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

use vclip_models::encoding::{output_dimensions, BitrateTarget, FAST_PATH_FPS, KEYFRAME_INTERVAL};
use vclip_models::{EncoderKind, OutputFormat};

use crate::capabilities::EnvironmentCapabilities;
use crate::encoder::{ClipEncoder, EncodeJob, EncodedClip};
use crate::error::{MediaError, MediaResult};
use crate::filters::build_fast_path_filter;
use crate::fs_utils::remove_if_exists;
use crate::metrics::record_encode;
use crate::progress::{PhaseRange, ProgressReporter};

/// Opening the source and reading stream parameters.
pub const LOAD_PHASE: PhaseRange = PhaseRange::new(0.0, 15.0);
/// Building the filter graph and opening the encoder.
pub const SETUP_PHASE: PhaseRange = PhaseRange::new(15.0, 35.0);
/// Per-frame decode, filter and encode.
pub const ENCODE_PHASE: PhaseRange = PhaseRange::new(35.0, 90.0);
/// Draining the encoder and finalizing the container.
pub const FLUSH_PHASE: PhaseRange = PhaseRange::new(90.0, 100.0);

/// Parameters of one native encode session, derived from the job alone.
#[derive(Debug, Clone, PartialEq)]
pub struct FastPathPlan {
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub bitrate: BitrateTarget,
    /// libavfilter graph description applied between decoder and encoder
    pub filter: String,
    pub start_time: f64,
    pub end_time: f64,
    pub fps: u32,
    pub keyframe_interval: u64,
    /// Copy the source audio track into the output when possible
    pub copy_audio: bool,
}

impl FastPathPlan {
    pub fn for_job(job: &EncodeJob) -> Self {
        let options = job.request.options;
        let (width, height) = output_dimensions(&options, job.metadata.width, job.metadata.height);

        Self {
            format: options.format,
            width,
            height,
            bitrate: BitrateTarget::for_output(width, height, options.quality),
            filter: build_fast_path_filter(&options, job.metadata.width, job.metadata.height),
            start_time: job.request.start_time,
            end_time: job.request.end_time,
            fps: FAST_PATH_FPS,
            keyframe_interval: KEYFRAME_INTERVAL,
            copy_audio: job.metadata.has_audio && options.format == OutputFormat::Mp4,
        }
    }

    /// Number of frames the session emits.
    pub fn expected_frames(&self) -> u64 {
        ((self.end_time - self.start_time) * self.fps as f64).ceil().max(1.0) as u64
    }
}

/// Native codec encoder.
pub struct FastPathEncoder {
    capabilities: EnvironmentCapabilities,
}

impl FastPathEncoder {
    pub fn new(capabilities: EnvironmentCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &EnvironmentCapabilities {
        &self.capabilities
    }
}

#[async_trait]
impl ClipEncoder for FastPathEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::FastPath
    }

    async fn encode(
        &self,
        job: &EncodeJob,
        progress: &ProgressReporter,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<EncodedClip> {
        let format = job.request.options.format;
        if !self.capabilities.supports_fast_path(format) {
            return Err(MediaError::unsupported(format!(
                "no native encoder for {}",
                format
            )));
        }
        if *cancel.borrow() {
            return Err(MediaError::Cancelled);
        }

        let started = Instant::now();
        progress.report_phase(LOAD_PHASE, 0.0);
        let plan = FastPathPlan::for_job(job);
        let output = job.output_path();

        match run_session(job, plan, progress, cancel).await {
            Ok(clip) => {
                record_encode(EncoderKind::FastPath, started.elapsed().as_secs_f64());
                info!(
                    job_id = %job.job_id,
                    size_bytes = clip.size_bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Fast path encode complete"
                );
                Ok(clip)
            }
            Err(e) => {
                if let Err(cleanup) = remove_if_exists(&output).await {
                    warn!(path = %output.display(), error = %cleanup, "Failed to remove partial output");
                }
                Err(e)
            }
        }
    }
}

#[cfg(feature = "native-encoder")]
async fn run_session(
    job: &EncodeJob,
    plan: FastPathPlan,
    progress: &ProgressReporter,
    cancel: watch::Receiver<bool>,
) -> MediaResult<EncodedClip> {
    native::encode(job, plan, progress.clone(), cancel).await
}

#[cfg(not(feature = "native-encoder"))]
async fn run_session(
    _job: &EncodeJob,
    _plan: FastPathPlan,
    _progress: &ProgressReporter,
    _cancel: watch::Receiver<bool>,
) -> MediaResult<EncodedClip> {
    Err(MediaError::unsupported(
        "built without the native-encoder feature",
    ))
}
