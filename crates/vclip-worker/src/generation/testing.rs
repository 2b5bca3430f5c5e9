//! Fake encoders and probe for service and scheduler tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{watch, Notify};

use vclip_media::{ClipEncoder, EncodeJob, EncodedClip, MediaError, MediaProbe, MediaResult, ProgressReporter};
use vclip_models::{EncoderKind, MediaMetadata};

/// Write a fake source file of `size` bytes.
pub(crate) fn source_file(dir: &tempfile::TempDir, size: usize) -> PathBuf {
    let path = dir.path().join("source.mp4");
    std::fs::write(&path, vec![0u8; size]).unwrap();
    path
}

pub(crate) struct FakeProbe {
    duration: f64,
}

impl FakeProbe {
    pub(crate) fn new(duration: f64) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> MediaResult<MediaMetadata> {
        Ok(MediaMetadata {
            duration: self.duration,
            width: 1920,
            height: 1080,
            has_audio: true,
            fps: 30.0,
            codec: "h264".to_string(),
            size_bytes: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        })
    }
}

enum Behavior {
    Succeed,
    Fail,
    /// Holds a scratch file until cancelled
    Block(PathBuf),
}

pub(crate) struct FakeEncoder {
    kind: EncoderKind,
    behavior: Behavior,
    delay: Option<Duration>,
    failing_start: Option<f64>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Notify,
}

impl FakeEncoder {
    fn with_behavior(kind: EncoderKind, behavior: Behavior) -> Self {
        Self {
            kind,
            behavior,
            delay: None,
            failing_start: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: Notify::new(),
        }
    }

    pub(crate) fn succeeding(kind: EncoderKind) -> Self {
        Self::with_behavior(kind, Behavior::Succeed)
    }

    pub(crate) fn failing(kind: EncoderKind) -> Self {
        Self::with_behavior(kind, Behavior::Fail)
    }

    pub(crate) fn blocking(kind: EncoderKind, scratch: &Path) -> Self {
        Self::with_behavior(kind, Behavior::Block(scratch.to_path_buf()))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail only the clip starting at `start`.
    pub(crate) fn with_failing_start(mut self, start: f64) -> Self {
        self.failing_start = Some(start);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_started(&self) {
        self.started.notified().await;
    }

    async fn run(
        &self,
        job: &EncodeJob,
        progress: &ProgressReporter,
        mut cancel: watch::Receiver<bool>,
    ) -> MediaResult<EncodedClip> {
        if let Behavior::Block(scratch) = &self.behavior {
            std::fs::create_dir_all(scratch)?;
            let partial = scratch.join(format!("{}.partial", job.job_id));
            std::fs::write(&partial, b"partial")?;
            self.started.notify_one();

            let _ = cancel.wait_for(|c| *c).await;
            std::fs::remove_file(&partial)?;
            return Err(MediaError::Cancelled);
        }

        self.started.notify_one();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let fails = matches!(self.behavior, Behavior::Fail) || self.failing_start == Some(job.request.start_time);
        if fails {
            progress.report(30.0);
            return Err(MediaError::encode_failed(format!("{} encoder failed", self.kind)));
        }

        progress.report(50.0);
        let path = job.output_path();
        std::fs::create_dir_all(&job.output_dir)?;
        std::fs::write(&path, b"clip")?;
        progress.report(100.0);

        Ok(EncodedClip {
            path,
            size_bytes: 4,
            duration_seconds: job.request.duration(),
            width: 1280,
            height: 720,
        })
    }
}

#[async_trait]
impl ClipEncoder for FakeEncoder {
    fn kind(&self) -> EncoderKind {
        self.kind
    }

    async fn encode(
        &self,
        job: &EncodeJob,
        progress: &ProgressReporter,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<EncodedClip> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.run(job, progress, cancel).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
