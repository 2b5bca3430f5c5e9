//! Frame extraction for multi-model analysis.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::Path;
use tracing::debug;

use vclip_models::ExtractedFrame;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::filter_thumbnail;

/// Width analysis frames are scaled to.
pub const ANALYSIS_FRAME_WIDTH: u32 = 512;

/// Evenly spaced sample points, each centred in its slice of the video.
pub fn frame_timestamps(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 || !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }
    let step = duration / count as f64;
    (0..count).map(|i| step * (i as f64 + 0.5)).collect()
}

/// Extract `count` JPEG frames from a video, base64-encoded.
pub async fn extract_frames(
    video_path: impl AsRef<Path>,
    duration: f64,
    count: usize,
) -> MediaResult<Vec<ExtractedFrame>> {
    extract_frames_with(&FfmpegRunner::new(), video_path.as_ref(), duration, count).await
}

/// [`extract_frames`] with an explicit runner (engine binary, timeout, cancel).
pub async fn extract_frames_with(
    runner: &FfmpegRunner,
    video_path: &Path,
    duration: f64,
    count: usize,
) -> MediaResult<Vec<ExtractedFrame>> {
    if !video_path.exists() {
        return Err(MediaError::FileNotFound(video_path.to_path_buf()));
    }

    let scratch = tempfile::Builder::new().prefix("vclip-frames-").tempdir()?;
    let filter = filter_thumbnail(ANALYSIS_FRAME_WIDTH);
    let mut frames = Vec::with_capacity(count);

    for (index, timestamp) in frame_timestamps(duration, count).into_iter().enumerate() {
        let output = scratch.path().join(format!("frame-{:04}.jpg", index));
        let cmd = FfmpegCommand::new(video_path, &output)
            .input_arg("-ss")
            .input_arg(format!("{:.3}", timestamp))
            .single_frame()
            .video_filter(&filter)
            .output_arg("-q:v")
            .output_arg("4")
            .log_level("error");

        runner.run(&cmd).await?;

        let bytes = tokio::fs::read(&output).await?;
        if bytes.is_empty() {
            return Err(MediaError::InvalidVideo(format!(
                "empty frame at {:.3}s",
                timestamp
            )));
        }

        frames.push(ExtractedFrame {
            timestamp,
            image_base64: STANDARD.encode(&bytes),
            mime_type: "image/jpeg".to_string(),
        });
    }

    debug!(
        path = %video_path.display(),
        frames = frames.len(),
        "Extracted analysis frames"
    );
    Ok(frames)
}
