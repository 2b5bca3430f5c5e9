//! Generation of many clips from one source file.

use futures::future::join_all;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};

use vclip_media::{ProgressFn, ProgressReporter};
use vclip_models::{BatchClip, BatchClipOutcome, BatchReport, ClipRequest, GenerationResult, JobId, JobStatus};

use super::service::{ClipGenerationService, Route};
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics::record_batch_clip;

/// Schedules a batch across the two encoders.
///
/// Clips run shortest first. Clips up to `fast_path_max_clip_secs` go to the
/// fast path when the service would pick it; everything else goes straight to
/// the fallback engine. Every fallback encode in the batch, including a retry
/// after a fast path failure, holds one of `fallback_concurrency` slots. A
/// failed clip never stops the batch.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    service: ClipGenerationService,
    fallback_concurrency: usize,
    fast_path_max_clip_secs: f64,
}

impl BatchScheduler {
    pub fn new(service: ClipGenerationService) -> Self {
        let defaults = WorkerConfig::default();
        Self {
            service,
            fallback_concurrency: defaults.fallback_concurrency,
            fast_path_max_clip_secs: defaults.fast_path_max_clip_secs,
        }
    }

    pub fn from_config(service: ClipGenerationService, config: &WorkerConfig) -> Self {
        Self::new(service)
            .with_fallback_concurrency(config.fallback_concurrency)
            .with_fast_path_max_clip_secs(config.fast_path_max_clip_secs)
    }

    pub fn with_fallback_concurrency(mut self, limit: usize) -> Self {
        self.fallback_concurrency = limit.max(1);
        self
    }

    pub fn with_fast_path_max_clip_secs(mut self, secs: f64) -> Self {
        self.fast_path_max_clip_secs = secs;
        self
    }

    pub async fn run(&self, source: &Path, clips: &[BatchClip], on_progress: Option<ProgressFn>) -> BatchReport {
        self.run_inner(source, clips, on_progress, None).await
    }

    /// Run a batch; flipping `cancel` cancels every clip still running.
    pub async fn run_with_cancel(
        &self,
        source: &Path,
        clips: &[BatchClip],
        on_progress: Option<ProgressFn>,
        cancel: watch::Receiver<bool>,
    ) -> BatchReport {
        self.run_inner(source, clips, on_progress, Some(cancel)).await
    }

    /// Submission indices ordered by clip duration, shortest first.
    pub fn execution_order(clips: &[BatchClip]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..clips.len()).collect();
        order.sort_by(|&a, &b| clips[a].duration().total_cmp(&clips[b].duration()));
        order
    }

    async fn run_inner(
        &self,
        source: &Path,
        clips: &[BatchClip],
        on_progress: Option<ProgressFn>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> BatchReport {
        let total = clips.len();
        let progress = ProgressReporter::from_callback(on_progress);
        let source_size = tokio::fs::metadata(source).await.map(|m| m.len()).ok();
        let fallback_slots = Arc::new(Semaphore::new(self.fallback_concurrency));
        let settled = AtomicUsize::new(0);

        info!(
            source = %source.display(),
            clips = total,
            fallback_concurrency = self.fallback_concurrency,
            "Starting batch"
        );

        let tasks = Self::execution_order(clips).into_iter().map(|index| {
            let clip = &clips[index];
            let request = ClipRequest::new(source, clip.start_time, clip.end_time).with_options(clip.options);
            let route = self.route_for(clip, source_size);
            let fallback_slots = fallback_slots.clone();
            let cancel = cancel.clone();
            let progress = &progress;
            let settled = &settled;

            async move {
                let outcome = self.generate(request.clone(), route, fallback_slots, cancel).await;
                let done = settled.fetch_add(1, Ordering::SeqCst) + 1;
                progress.report(done as f64 / total as f64 * 100.0);
                (index, request, outcome)
            }
        });

        let mut report = BatchReport::default();
        for (index, request, outcome) in join_all(tasks).await {
            record_batch_clip(outcome.is_ok());
            let outcome = match outcome {
                Ok(result) => BatchClipOutcome {
                    index,
                    status: JobStatus::Completed,
                    result: Some(result),
                    error: None,
                },
                Err(e) => {
                    warn!(clip_index = index, error = %e, "Batch clip failed");
                    let message = e.to_string();
                    // WorkerError does not carry the job id, so the failed result gets its own
                    BatchClipOutcome {
                        index,
                        status: JobStatus::Failed,
                        result: Some(GenerationResult::failed(JobId::new(), &request, message.clone())),
                        error: Some(message),
                    }
                }
            };
            report.outcomes.insert(index, outcome);
        }

        progress.report(100.0);
        report.progress = 100;

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch complete"
        );
        report
    }

    fn route_for(&self, clip: &BatchClip, source_size: Option<u64>) -> Route {
        let fast_eligible = clip.duration() <= self.fast_path_max_clip_secs
            && source_size.is_some_and(|size| self.service.prefers_fast_path(clip.options.format, size));
        if fast_eligible {
            Route::Auto
        } else {
            Route::Fallback
        }
    }

    async fn generate(
        &self,
        request: ClipRequest,
        route: Route,
        fallback_slots: Arc<Semaphore>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> WorkerResult<GenerationResult> {
        self.service
            .submit(request, None, cancel, route, Some(fallback_slots))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::testing::{source_file, FakeEncoder, FakeProbe};
    use std::sync::Mutex;
    use std::time::Duration;
    use vclip_media::EnvironmentCapabilities;
    use vclip_models::{EncoderKind, OutputFormat};

    fn clip(start: f64, end: f64) -> BatchClip {
        BatchClip {
            start_time: start,
            end_time: end,
            options: Default::default(),
        }
    }

    fn service(
        dir: &tempfile::TempDir,
        capabilities: EnvironmentCapabilities,
        fast: Arc<FakeEncoder>,
        fallback: Arc<FakeEncoder>,
    ) -> ClipGenerationService {
        ClipGenerationService::new(
            capabilities,
            fast,
            fallback,
            Arc::new(FakeProbe::new(600.0)),
            dir.path().join("out"),
        )
    }

    #[test]
    fn test_execution_order_shortest_first() {
        let clips = vec![clip(0.0, 45.0), clip(10.0, 15.0), clip(100.0, 120.0)];
        assert_eq!(BatchScheduler::execution_order(&clips), vec![1, 2, 0]);
    }

    #[tokio::test]
    async fn test_failed_clip_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(&dir, 64);
        let fast = Arc::new(FakeEncoder::succeeding(EncoderKind::FastPath));
        let fallback = Arc::new(FakeEncoder::succeeding(EncoderKind::Fallback).with_failing_start(20.0));
        let scheduler = BatchScheduler::new(service(&dir, EnvironmentCapabilities::none(), fast, fallback));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let on_progress: ProgressFn = Arc::new(move |p: u8| sink.lock().unwrap().push(p));

        let clips = vec![clip(0.0, 10.0), clip(20.0, 30.0), clip(40.0, 50.0)];
        let report = scheduler.run(&source, &clips, Some(on_progress)).await;

        assert_eq!(report.status_of(0), Some(JobStatus::Completed));
        assert_eq!(report.status_of(1), Some(JobStatus::Failed));
        assert_eq!(report.status_of(2), Some(JobStatus::Completed));
        assert!(report.outcomes[&1].error.as_ref().unwrap().contains("fallback encoder failed"));
        let failed = report.outcomes[&1].result.as_ref().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.payload.is_none());
        assert_eq!(failed.error, report.outcomes[&1].error);
        assert_eq!((report.succeeded(), report.failed()), (2, 1));
        assert_eq!(report.progress, 100);
        assert_eq!(seen.lock().unwrap().last(), Some(&100));
    }

    #[tokio::test]
    async fn test_fallback_concurrency_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(&dir, 64);
        let fast = Arc::new(FakeEncoder::succeeding(EncoderKind::FastPath));
        let fallback = Arc::new(
            FakeEncoder::succeeding(EncoderKind::Fallback).with_delay(Duration::from_millis(30)),
        );
        let scheduler = BatchScheduler::new(service(&dir, EnvironmentCapabilities::none(), fast, fallback.clone()))
            .with_fallback_concurrency(2);

        let clips: Vec<BatchClip> = (0..6).map(|i| clip(i as f64 * 10.0, i as f64 * 10.0 + 5.0)).collect();
        let report = scheduler.run(&source, &clips, None).await;

        assert_eq!(report.succeeded(), 6);
        assert_eq!(fallback.calls(), 6);
        assert!(fallback.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_fast_path_retries_share_the_fallback_cap() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(&dir, 64);
        let fast = Arc::new(FakeEncoder::failing(EncoderKind::FastPath));
        let fallback = Arc::new(
            FakeEncoder::succeeding(EncoderKind::Fallback).with_delay(Duration::from_millis(100)),
        );
        let capabilities = EnvironmentCapabilities::with_native_formats([OutputFormat::Mp4]);
        let scheduler = BatchScheduler::new(service(&dir, capabilities, fast.clone(), fallback.clone()))
            .with_fallback_concurrency(2);

        let clips: Vec<BatchClip> = (0..6).map(|i| clip(i as f64 * 10.0, i as f64 * 10.0 + 5.0)).collect();
        let report = scheduler.run(&source, &clips, None).await;

        assert_eq!(report.succeeded(), 6);
        assert_eq!((fast.calls(), fallback.calls()), (6, 6));
        assert!(fallback.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_short_clips_take_fast_path_long_clips_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(&dir, 64);
        let fast = Arc::new(FakeEncoder::succeeding(EncoderKind::FastPath));
        let fallback = Arc::new(FakeEncoder::succeeding(EncoderKind::Fallback));
        let capabilities = EnvironmentCapabilities::with_native_formats([OutputFormat::Mp4]);
        let scheduler = BatchScheduler::new(service(&dir, capabilities, fast.clone(), fallback.clone()));

        let clips = vec![clip(0.0, 20.0), clip(30.0, 90.0), clip(100.0, 130.0)];
        let report = scheduler.run(&source, &clips, None).await;

        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.outcomes[&0].result.as_ref().unwrap().encoder, Some(EncoderKind::FastPath));
        assert_eq!(report.outcomes[&1].result.as_ref().unwrap().encoder, Some(EncoderKind::Fallback));
        assert_eq!(report.outcomes[&2].result.as_ref().unwrap().encoder, Some(EncoderKind::FastPath));
        assert_eq!((fast.calls(), fallback.calls()), (2, 1));
    }

    #[tokio::test]
    async fn test_empty_batch_completes() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(&dir, 64);
        let fast = Arc::new(FakeEncoder::succeeding(EncoderKind::FastPath));
        let fallback = Arc::new(FakeEncoder::succeeding(EncoderKind::Fallback));
        let scheduler = BatchScheduler::new(service(&dir, EnvironmentCapabilities::none(), fast, fallback));

        let report = scheduler.run(&source, &[], None).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.progress, 100);
    }
}
