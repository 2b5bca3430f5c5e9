//! [`ClipEncoder`] backed by the fallback engine.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info};

use vclip_models::encoding::{output_dimensions, EncodingPreset};
use vclip_models::EncoderKind;

use super::engine::FallbackEngine;
use crate::command::{wait_for_cancel, FfmpegCommand, FfmpegRunner};
use crate::encoder::{ClipEncoder, EncodeJob, EncodedClip};
use crate::error::{MediaError, MediaResult};
use crate::filters::build_filter_chain;
use crate::fs_utils::{move_file, remove_if_exists, remove_quietly, stage_file};
use crate::metrics::record_encode;
use crate::progress::{PhaseRange, ProgressReporter};

const INIT_PHASE: PhaseRange = PhaseRange::new(0.0, 10.0);
const STAGE_PHASE: PhaseRange = PhaseRange::new(10.0, 15.0);
const ENCODE_PHASE: PhaseRange = PhaseRange::new(15.0, 95.0);

/// Encodes clips by running the fallback engine as a subprocess.
///
/// Input and output live in the engine workspace under job-unique names and
/// are removed when the encode finishes, whatever the outcome.
pub struct FallbackEncoder {
    engine: Arc<FallbackEngine>,
    timeout_secs: Option<u64>,
}

impl FallbackEncoder {
    pub fn new(engine: Arc<FallbackEngine>) -> Self {
        Self {
            engine,
            timeout_secs: None,
        }
    }

    /// Kill the engine process if one encode runs longer than this.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn engine(&self) -> &Arc<FallbackEngine> {
        &self.engine
    }
}

#[async_trait]
impl ClipEncoder for FallbackEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::Fallback
    }

    async fn encode(
        &self,
        job: &EncodeJob,
        progress: &ProgressReporter,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<EncodedClip> {
        let started = Instant::now();
        progress.report_phase(INIT_PHASE, 0.0);

        let engine = tokio::select! {
            engine = self.engine.get_or_init() => engine?,
            _ = wait_for_cancel(Some(cancel.clone())) => return Err(MediaError::Cancelled),
        };
        progress.report_phase(INIT_PHASE, 1.0);

        let request = &job.request;
        let options = request.options;
        let source_ext = request
            .source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let input = engine
            .workspace()
            .join(format!("{}-input.{}", job.job_id, source_ext));
        let output = engine
            .workspace()
            .join(format!("{}-output.{}", job.job_id, options.format.extension()));

        let _cleanup = scopeguard::guard(vec![input.clone(), output.clone()], |paths: Vec<PathBuf>| {
            for path in &paths {
                remove_quietly(path);
            }
        });

        stage_file(&request.source, &input).await?;
        progress.report_phase(STAGE_PHASE, 1.0);

        let preset = EncodingPreset::for_output(options.quality, options.format);
        let filter = build_filter_chain(&options, job.metadata.width, job.metadata.height);
        let duration = request.duration();

        let mut cmd = FfmpegCommand::new(&input, &output)
            .seek(request.start_time)
            .duration(duration)
            .video_filter(filter)
            .output_args(preset.to_ffmpeg_args(options.format));
        if !job.metadata.has_audio {
            cmd = cmd.no_audio();
        }

        let mut runner = FfmpegRunner::with_program(engine.binary()).with_cancel(cancel);
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }

        debug!(
            job_id = %job.job_id,
            engine = %engine.binary().display(),
            crf = preset.crf,
            "Running fallback encode"
        );

        let total_ms = (duration * 1000.0) as i64;
        let reporter = progress.clone();
        runner
            .run_with_progress(&cmd, move |p| {
                reporter.report_phase(ENCODE_PHASE, p.percentage(total_ms) / 100.0);
            })
            .await?;

        let destination = job.output_path();
        move_file(&output, &destination).await?;

        let size_bytes = match tokio::fs::metadata(&destination).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                let _ = remove_if_exists(&destination).await;
                return Err(e.into());
            }
        };
        if size_bytes == 0 {
            let _ = remove_if_exists(&destination).await;
            return Err(MediaError::encode_failed("fallback engine produced an empty file"));
        }

        let (width, height) = output_dimensions(&options, job.metadata.width, job.metadata.height);
        progress.report(100.0);
        record_encode(EncoderKind::Fallback, started.elapsed().as_secs_f64());

        info!(
            job_id = %job.job_id,
            size_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fallback encode complete"
        );

        Ok(EncodedClip {
            path: destination,
            size_bytes,
            duration_seconds: duration,
            width,
            height,
        })
    }
}
