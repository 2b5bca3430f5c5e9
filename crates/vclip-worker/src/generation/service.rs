//! Clip generation: encoder selection, deduplication and fast path fallback.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{info, Instrument};

use vclip_media::{
    ClipEncoder, EncodeJob, EncodedClip, EngineConfig, EnvironmentCapabilities, FallbackEncoder, FallbackEngine,
    FastPathEncoder, FfprobeMediaProbe, MediaError, MediaProbe, ProgressFn, ProgressReporter,
};
use vclip_models::{ClipRequest, EncoderKind, GenerationJob, GenerationResult, JobId, OutputFormat, SourceIdentity};

use super::registry::{Acquired, FailureKind, JobFailure, JobHandle, JobLease, JobRegistry};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics::{record_dedup_join, record_fast_path_retry, record_generated, record_generation_failure};

/// Pick the backend for a job.
///
/// The fast path is used only when the host can natively encode the
/// requested container and the source is below `fast_path_max_bytes`.
pub fn select_encoder(
    capabilities: &EnvironmentCapabilities,
    format: OutputFormat,
    source_size: u64,
    fast_path_max_bytes: u64,
) -> EncoderKind {
    if capabilities.supports_fast_path(format) && source_size < fast_path_max_bytes {
        EncoderKind::FastPath
    } else {
        EncoderKind::Fallback
    }
}

/// Encoder routing requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Let [`select_encoder`] decide
    Auto,
    /// Skip the fast path
    Fallback,
}

struct ServiceInner {
    capabilities: EnvironmentCapabilities,
    fast_path: Arc<dyn ClipEncoder>,
    fallback: Arc<dyn ClipEncoder>,
    probe: Arc<dyn MediaProbe>,
    registry: JobRegistry,
    output_dir: PathBuf,
    fast_path_max_bytes: u64,
}

/// Generates clips, one encode per unique request at a time.
#[derive(Clone)]
pub struct ClipGenerationService {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for ClipGenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipGenerationService")
            .field("capabilities", &self.inner.capabilities)
            .field("output_dir", &self.inner.output_dir)
            .field("in_flight", &self.inner.registry.len())
            .finish()
    }
}

impl ClipGenerationService {
    pub fn new(
        capabilities: EnvironmentCapabilities,
        fast_path: Arc<dyn ClipEncoder>,
        fallback: Arc<dyn ClipEncoder>,
        probe: Arc<dyn MediaProbe>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                capabilities,
                fast_path,
                fallback,
                probe,
                registry: JobRegistry::new(),
                output_dir: output_dir.into(),
                fast_path_max_bytes: WorkerConfig::default().fast_path_max_bytes,
            }),
        }
    }

    /// Compose the production service: native fast path, FFmpeg fallback engine, ffprobe.
    pub fn from_config(config: &WorkerConfig, capabilities: EnvironmentCapabilities) -> Self {
        let engine = Arc::new(FallbackEngine::new(EngineConfig::from_env()));
        let fallback = FallbackEncoder::new(engine).with_timeout(config.encode_timeout.as_secs());
        Self::new(
            capabilities.clone(),
            Arc::new(FastPathEncoder::new(capabilities)),
            Arc::new(fallback),
            Arc::new(FfprobeMediaProbe),
            config.output_dir(),
        )
        .with_fast_path_max_bytes(config.fast_path_max_bytes)
    }

    /// Only valid before the service is shared.
    pub fn with_fast_path_max_bytes(mut self, max_bytes: u64) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.fast_path_max_bytes = max_bytes;
        }
        self
    }

    pub fn capabilities(&self) -> &EnvironmentCapabilities {
        &self.inner.capabilities
    }

    pub fn output_dir(&self) -> &Path {
        &self.inner.output_dir
    }

    /// Whether a job for this container and source size would start on the fast path.
    pub fn prefers_fast_path(&self, format: OutputFormat, source_size: u64) -> bool {
        select_encoder(
            &self.inner.capabilities,
            format,
            source_size,
            self.inner.fast_path_max_bytes,
        ) == EncoderKind::FastPath
    }

    pub async fn generate_clip(
        &self,
        request: ClipRequest,
        on_progress: Option<ProgressFn>,
    ) -> WorkerResult<GenerationResult> {
        self.submit(request, on_progress, None, Route::Auto, None).await
    }

    /// Like [`generate_clip`](Self::generate_clip), cancelling the job when `cancel` flips to true.
    ///
    /// A deduplicated job is shared, so cancelling it cancels it for every caller.
    pub async fn generate_clip_with_cancel(
        &self,
        request: ClipRequest,
        on_progress: Option<ProgressFn>,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<GenerationResult> {
        self.submit(request, on_progress, Some(cancel), Route::Auto, None).await
    }

    /// Cancel a running job. Returns false if it is not running.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        self.inner.registry.cancel(job_id)
    }

    /// Jobs currently in flight.
    pub fn active_jobs(&self) -> Vec<GenerationJob> {
        self.inner.registry.snapshot()
    }

    /// When `fallback_slots` is set, every fallback encode of a job this call
    /// leads holds one of its permits, including the retry after a fast path failure.
    pub(crate) async fn submit(
        &self,
        request: ClipRequest,
        on_progress: Option<ProgressFn>,
        cancel: Option<watch::Receiver<bool>>,
        route: Route,
        fallback_slots: Option<Arc<Semaphore>>,
    ) -> WorkerResult<GenerationResult> {
        if let Err(e) = request.validate_range() {
            record_generation_failure("invalid");
            return Err(e.into());
        }

        let identity = source_identity(&request.source).await?;
        let fingerprint = request.fingerprint(&identity);

        let handle = match self.inner.registry.acquire_or_join(&fingerprint, &request) {
            Acquired::Leader(lease) => {
                let handle = lease.handle();
                let inner = self.inner.clone();
                tokio::spawn(run_job(inner, lease, identity.size_bytes, route, fallback_slots));
                handle
            }
            Acquired::Joined(handle) => {
                record_dedup_join();
                info!(
                    job_id = %handle.job_id(),
                    fingerprint = %fingerprint,
                    "Joined identical in-flight job"
                );
                handle
            }
        };

        let reporter = ProgressReporter::from_callback(on_progress);
        let forwarder = tokio::spawn(forward_progress(handle.clone(), reporter.clone()));

        let outcome = match cancel {
            Some(signal) => {
                tokio::select! {
                    outcome = handle.wait() => outcome,
                    _ = cancel_requested(signal) => {
                        handle.cancel();
                        handle.wait().await
                    }
                }
            }
            None => handle.wait().await,
        };
        forwarder.abort();

        match outcome {
            Ok(result) => {
                reporter.report(100.0);
                Ok(result)
            }
            Err(failure) => Err(failure.into()),
        }
    }
}

/// Leader side of a job: runs the encode and settles the lease.
async fn run_job(
    inner: Arc<ServiceInner>,
    lease: JobLease,
    source_size: u64,
    route: Route,
    fallback_slots: Option<Arc<Semaphore>>,
) {
    let job_id = lease.job_id().clone();
    let logger = JobLogger::new(&job_id, lease.fingerprint());
    let span = logger.span();

    let started = Instant::now();
    let outcome = execute(&inner, &lease, &logger, source_size, route, fallback_slots.as_ref())
        .instrument(span)
        .await;

    let outcome = match outcome {
        Ok(result) => {
            if let Some(encoder) = result.encoder {
                record_generated(encoder, started.elapsed().as_secs_f64());
            }
            logger.completed(&result);
            Ok(result)
        }
        Err(e) => {
            let failure = JobFailure::from_error(job_id, &e);
            record_generation_failure(match failure.kind {
                FailureKind::Cancelled => "cancelled",
                FailureKind::Invalid => "invalid",
                FailureKind::Failed => "failed",
            });
            logger.failed(&failure);
            Err(failure)
        }
    };

    lease.settle(outcome);
}

async fn execute(
    inner: &ServiceInner,
    lease: &JobLease,
    logger: &JobLogger,
    source_size: u64,
    route: Route,
    fallback_slots: Option<&Arc<Semaphore>>,
) -> WorkerResult<GenerationResult> {
    let request = lease.request();
    let cancel = lease.cancel_signal();
    if *cancel.borrow() {
        return Err(WorkerError::Cancelled);
    }

    let metadata = inner.probe.probe(&request.source).await?;
    logger.probed(&metadata);
    request.validate(&metadata)?;

    tokio::fs::create_dir_all(&inner.output_dir).await?;
    let job = EncodeJob {
        job_id: lease.job_id().clone(),
        request: request.clone(),
        metadata,
        output_dir: inner.output_dir.clone(),
    };
    let progress = lease.progress_reporter();

    let selected = match route {
        Route::Auto => select_encoder(
            &inner.capabilities,
            request.options.format,
            source_size,
            inner.fast_path_max_bytes,
        ),
        Route::Fallback => EncoderKind::Fallback,
    };
    lease.start(selected);
    logger.started(&request, selected);

    let (clip, encoder) = match selected {
        EncoderKind::FastPath => match inner.fast_path.encode(&job, &progress, cancel.clone()).await {
            Ok(clip) => (clip, EncoderKind::FastPath),
            Err(e) if e.is_cancelled() || *cancel.borrow() => return Err(WorkerError::Cancelled),
            Err(e) => {
                logger.fallback_retry(&e);
                record_fast_path_retry();
                lease.start(EncoderKind::Fallback);
                let clip = encode_on_fallback(inner, &job, &progress, &cancel, fallback_slots).await?;
                (clip, EncoderKind::Fallback)
            }
        },
        EncoderKind::Fallback => {
            let clip = encode_on_fallback(inner, &job, &progress, &cancel, fallback_slots).await?;
            (clip, EncoderKind::Fallback)
        }
    };

    Ok(GenerationResult::completed(
        job.job_id,
        &request,
        clip.path,
        clip.size_bytes,
        clip.duration_seconds,
        encoder,
    ))
}

async fn encode_on_fallback(
    inner: &ServiceInner,
    job: &EncodeJob,
    progress: &ProgressReporter,
    cancel: &watch::Receiver<bool>,
    fallback_slots: Option<&Arc<Semaphore>>,
) -> WorkerResult<EncodedClip> {
    let _permit = match fallback_slots {
        Some(slots) => Some(acquire_slot(slots.clone(), cancel.clone()).await?),
        None => None,
    };
    inner
        .fallback
        .encode(job, progress, cancel.clone())
        .await
        .map_err(|e| classify(e, cancel))
}

/// Wait for a fallback slot, giving up if the job is cancelled first.
async fn acquire_slot(slots: Arc<Semaphore>, cancel: watch::Receiver<bool>) -> WorkerResult<OwnedSemaphorePermit> {
    if *cancel.borrow() {
        return Err(WorkerError::Cancelled);
    }
    tokio::select! {
        permit = slots.acquire_owned() => permit.map_err(|_| WorkerError::job_failed("fallback slots closed")),
        _ = cancel_requested(cancel) => Err(WorkerError::Cancelled),
    }
}

/// An encoder error raised after cancellation was requested is a cancellation.
fn classify(error: MediaError, cancel: &watch::Receiver<bool>) -> WorkerError {
    if error.is_cancelled() || *cancel.borrow() {
        WorkerError::Cancelled
    } else {
        error.into()
    }
}

async fn forward_progress(handle: JobHandle, reporter: ProgressReporter) {
    let mut progress = handle.subscribe_progress();
    loop {
        let percent = *progress.borrow_and_update();
        if percent > 0 {
            reporter.report(percent as f64);
        }
        if progress.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves once `signal` reads true; never resolves if the sender goes away first.
async fn cancel_requested(mut signal: watch::Receiver<bool>) {
    if signal.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// File identity used in the dedup fingerprint.
async fn source_identity(path: &Path) -> WorkerResult<SourceIdentity> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::FileNotFound(path.to_path_buf()).into());
        }
        Err(e) => return Err(e.into()),
    };
    let modified_unix_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64);
    Ok(SourceIdentity::new(path, metadata.len(), modified_unix_ms))
}
