//! In-flight job registry keyed by request fingerprint.
//!
//! At most one job runs per fingerprint. The first caller becomes the leader
//! and receives a [`JobLease`]; later callers join the running job through a
//! [`JobHandle`] and observe the same outcome. The entry is removed the moment
//! the lease settles, so completed jobs are never retained.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use vclip_media::ProgressReporter;
use vclip_models::{ClipRequest, EncoderKind, GenerationJob, GenerationResult, JobId};

use crate::error::WorkerError;

/// Settled outcome shared by every caller of one job.
pub type JobOutcome = Result<GenerationResult, JobFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rejected before any encoder ran
    Invalid,
    Cancelled,
    Failed,
}

/// Cloneable failure of a shared job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub job_id: JobId,
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn from_error(job_id: JobId, error: &WorkerError) -> Self {
        let kind = if error.is_cancelled() {
            FailureKind::Cancelled
        } else if error.is_invalid_request() {
            FailureKind::Invalid
        } else {
            FailureKind::Failed
        };
        let message = match error {
            WorkerError::JobFailed(m) | WorkerError::InvalidRequest(m) => m.clone(),
            WorkerError::Request(e) => e.to_string(),
            other => other.to_string(),
        };
        Self { job_id, kind, message }
    }

    fn abandoned(job_id: JobId) -> Self {
        Self {
            job_id,
            kind: FailureKind::Failed,
            message: "job ended without a result".to_string(),
        }
    }
}

impl From<JobFailure> for WorkerError {
    fn from(failure: JobFailure) -> Self {
        match failure.kind {
            FailureKind::Cancelled => WorkerError::Cancelled,
            FailureKind::Invalid => WorkerError::InvalidRequest(failure.message),
            FailureKind::Failed => WorkerError::JobFailed(failure.message),
        }
    }
}

/// A view of a running job, held by every caller.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: JobId,
    outcome: watch::Receiver<Option<JobOutcome>>,
    progress: watch::Receiver<u8>,
    cancel: Arc<watch::Sender<bool>>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Request cancellation. Affects every caller sharing the job.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.clone()
    }

    /// Wait until the job settles.
    pub async fn wait(&self) -> JobOutcome {
        let mut outcome = self.outcome.clone();
        let settled = match outcome.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| Err(JobFailure::abandoned(self.job_id.clone())))
    }
}

struct InFlight {
    job: Arc<Mutex<GenerationJob>>,
    handle: JobHandle,
}

/// Result of [`JobRegistry::acquire_or_join`].
pub enum Acquired {
    /// No identical job was running; the caller must run it and settle the lease.
    Leader(JobLease),
    /// An identical job is already running.
    Joined(JobHandle),
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry").field("in_flight", &self.len()).finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Join the job running for `fingerprint`, or register a new one.
    pub fn acquire_or_join(&self, fingerprint: &str, request: &ClipRequest) -> Acquired {
        let mut entries = self.entries();
        if let Some(existing) = entries.get(fingerprint) {
            return Acquired::Joined(existing.handle.clone());
        }

        let job_id = JobId::new();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let (progress_tx, progress_rx) = watch::channel(0u8);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = JobHandle {
            job_id: job_id.clone(),
            outcome: outcome_rx,
            progress: progress_rx,
            cancel: Arc::new(cancel_tx),
        };
        let job = Arc::new(Mutex::new(GenerationJob::new(job_id, request.clone())));

        entries.insert(
            fingerprint.to_string(),
            InFlight {
                job: job.clone(),
                handle: handle.clone(),
            },
        );

        Acquired::Leader(JobLease {
            registry: self.clone(),
            fingerprint: fingerprint.to_string(),
            handle,
            job,
            outcome_tx,
            progress_tx: Arc::new(progress_tx),
            cancel_rx,
            settled: false,
        })
    }

    /// Request cancellation of a running job. Returns false if no such job is running.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let entries = self.entries();
        match entries.values().find(|e| e.handle.job_id() == job_id) {
            Some(entry) => {
                entry.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Snapshot of every running job.
    pub fn snapshot(&self) -> Vec<GenerationJob> {
        self.entries()
            .values()
            .map(|e| e.job.lock().unwrap_or_else(|p| p.into_inner()).clone())
            .collect()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.entries().contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, fingerprint: &str, job_id: &JobId) {
        let mut entries = self.entries();
        if entries
            .get(fingerprint)
            .is_some_and(|e| e.handle.job_id() == job_id)
        {
            entries.remove(fingerprint);
        }
    }
}

/// Ownership of a running job. Dropping it unsettled fails the job for every joiner.
pub struct JobLease {
    registry: JobRegistry,
    fingerprint: String,
    handle: JobHandle,
    job: Arc<Mutex<GenerationJob>>,
    outcome_tx: watch::Sender<Option<JobOutcome>>,
    progress_tx: Arc<watch::Sender<u8>>,
    cancel_rx: watch::Receiver<bool>,
    settled: bool,
}

impl JobLease {
    pub fn job_id(&self) -> &JobId {
        self.handle.job_id()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn handle(&self) -> JobHandle {
        self.handle.clone()
    }

    pub fn request(&self) -> ClipRequest {
        self.lock_job().request.clone()
    }

    /// Cancellation signal to pass to the encoder.
    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    /// Mark the job as processing on `encoder`.
    pub fn start(&self, encoder: EncoderKind) {
        self.lock_job().start(encoder);
    }

    /// Reporter that publishes the job's progress to every caller.
    pub fn progress_reporter(&self) -> ProgressReporter {
        let job = self.job.clone();
        let progress_tx = self.progress_tx.clone();
        ProgressReporter::new(move |percent| {
            job.lock().unwrap_or_else(|e| e.into_inner()).set_progress(percent);
            progress_tx.send_replace(percent);
        })
    }

    /// Deregister the job and publish its outcome.
    pub fn settle(mut self, outcome: JobOutcome) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: JobOutcome) {
        {
            let mut job = self.lock_job();
            match &outcome {
                Ok(_) => job.complete(),
                Err(failure) => job.fail(failure.message.clone()),
            }
        }
        self.registry.release(&self.fingerprint, self.handle.job_id());
        self.settled = true;
        self.outcome_tx.send_replace(Some(outcome));
    }

    fn lock_job(&self) -> MutexGuard<'_, GenerationJob> {
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for JobLease {
    fn drop(&mut self) {
        if !self.settled {
            let failure = JobFailure::abandoned(self.handle.job_id().clone());
            self.finish(Err(failure));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vclip_models::{JobStatus, OutputFormat};

    fn request() -> ClipRequest {
        ClipRequest::new("/videos/source.mp4", 5.0, 20.0)
    }

    fn leader(acquired: Acquired) -> JobLease {
        match acquired {
            Acquired::Leader(lease) => lease,
            Acquired::Joined(_) => panic!("expected a new job"),
        }
    }

    fn joined(acquired: Acquired) -> JobHandle {
        match acquired {
            Acquired::Joined(handle) => handle,
            Acquired::Leader(_) => panic!("expected to join"),
        }
    }

    fn result(id: &JobId) -> GenerationResult {
        GenerationResult::completed(
            id.clone(),
            &request(),
            "/out/clip.mp4".into(),
            42,
            15.0,
            EncoderKind::Fallback,
        )
    }

    #[tokio::test]
    async fn test_second_caller_joins_and_sees_same_outcome() {
        let registry = JobRegistry::new();
        let lease = leader(registry.acquire_or_join("fp", &request()));
        let handle = joined(registry.acquire_or_join("fp", &request()));
        assert_eq!(handle.job_id(), lease.job_id());
        assert_eq!(registry.len(), 1);

        let expected = result(lease.job_id());
        lease.settle(Ok(expected.clone()));

        assert_eq!(handle.wait().await.unwrap(), expected);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_settled_job_is_not_retained() {
        let registry = JobRegistry::new();
        let first = leader(registry.acquire_or_join("fp", &request()));
        let first_id = first.job_id().clone();
        first.settle(Ok(result(&first_id)));

        let second = leader(registry.acquire_or_join("fp", &request()));
        assert_ne!(second.job_id(), &first_id);
    }

    #[tokio::test]
    async fn test_dropped_lease_fails_joiners() {
        let registry = JobRegistry::new();
        let lease = leader(registry.acquire_or_join("fp", &request()));
        let handle = joined(registry.acquire_or_join("fp", &request()));

        drop(lease);

        let failure = handle.wait().await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Failed);
        assert!(!registry.contains("fp"));
    }

    #[test]
    fn test_cancel_by_job_id_reaches_lease() {
        let registry = JobRegistry::new();
        let lease = leader(registry.acquire_or_join("fp", &request()));
        let signal = lease.cancel_signal();

        assert!(!registry.cancel(&JobId::from_string("unknown")));
        assert!(registry.cancel(lease.job_id()));
        assert!(*signal.borrow());
    }

    #[test]
    fn test_snapshot_tracks_status_and_progress() {
        let registry = JobRegistry::new();
        let lease = leader(registry.acquire_or_join("fp", &request()));
        lease.start(EncoderKind::FastPath);

        let progress = lease.progress_reporter();
        progress.report(40.0);
        progress.report(10.0);

        let jobs = registry.snapshot();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Processing);
        assert_eq!(jobs[0].progress, 40);
        assert_eq!(jobs[0].encoder, Some(EncoderKind::FastPath));
        assert_eq!(*lease.handle().subscribe_progress().borrow(), 40);
        assert_eq!(jobs[0].request.options.format, OutputFormat::Mp4);
    }

    #[test]
    fn test_failure_maps_back_to_worker_error() {
        let id = JobId::new();
        let cancelled = JobFailure::from_error(id.clone(), &WorkerError::Cancelled);
        assert_eq!(cancelled.kind, FailureKind::Cancelled);
        assert!(WorkerError::from(cancelled).is_cancelled());

        let failed = JobFailure::from_error(id, &WorkerError::job_failed("encoder crashed"));
        assert!(matches!(WorkerError::from(failed), WorkerError::JobFailed(m) if m.contains("encoder crashed")));
    }
}
