//! Service and scheduler over the real fallback encoder, driven by a fake engine script.
#![cfg(unix)]

use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use vclip_media::{
    EngineConfig, EnvironmentCapabilities, FallbackEncoder, FallbackEngine, FastPathEncoder, MediaProbe,
    MediaResult,
};
use vclip_models::{BatchClip, ClipRequest, EncoderKind, JobStatus, MediaMetadata};
use vclip_worker::{BatchScheduler, ClipGenerationService, WorkerError};

struct StaticProbe;

#[async_trait]
impl MediaProbe for StaticProbe {
    async fn probe(&self, _path: &Path) -> MediaResult<MediaMetadata> {
        Ok(MediaMetadata {
            duration: 120.0,
            width: 1920,
            height: 1080,
            has_audio: true,
            fps: 30.0,
            codec: "h264".to_string(),
            size_bytes: 32,
        })
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    engine: Arc<FallbackEngine>,
    service: ClipGenerationService,
    source: PathBuf,
}

impl Fixture {
    /// `body` runs for every encode; `$last` holds the output path.
    fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let runs = dir.path().join("runs.log");
        let script = format!(
            "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then echo \"ffmpeg version fake\"; exit 0; fi\nfor last; do :; done\necho run >> \"{}\"\n{}\n",
            runs.display(),
            body
        );

        let engine_path = dir.path().join("bin/ffmpeg");
        std::fs::create_dir_all(engine_path.parent().unwrap()).unwrap();
        std::fs::write(&engine_path, script).unwrap();
        std::fs::set_permissions(&engine_path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let source = dir.path().join("source.mp4");
        std::fs::write(&source, vec![1u8; 32]).unwrap();

        let engine = Arc::new(FallbackEngine::new(EngineConfig {
            explicit_path: Some(engine_path),
            cache_dir: dir.path().join("cache"),
            use_system_path: false,
            mirrors: Vec::new(),
            source_timeout: Duration::from_secs(5),
            work_root: dir.path().join("work"),
            binary_name: "ffmpeg".to_string(),
        }));

        let service = ClipGenerationService::new(
            EnvironmentCapabilities::none(),
            Arc::new(FastPathEncoder::new(EnvironmentCapabilities::none())),
            Arc::new(FallbackEncoder::new(engine.clone())),
            Arc::new(StaticProbe),
            dir.path().join("clips"),
        );

        Self {
            dir,
            engine,
            service,
            source,
        }
    }

    fn engine_runs(&self) -> usize {
        std::fs::read_to_string(self.dir.path().join("runs.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    fn clips(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("clips"))
            .map(|d| d.count())
            .unwrap_or(0)
    }

    async fn workspace_entries(&self) -> usize {
        let handle = self.engine.get_or_init().await.unwrap();
        std::fs::read_dir(handle.workspace()).unwrap().count()
    }
}

const WRITE_OUTPUT: &str = "sleep 0.2\nprintf 'encoded' > \"$last\"";

#[tokio::test]
async fn test_concurrent_duplicates_share_one_engine_run() {
    let f = Fixture::new(WRITE_OUTPUT);
    let request = ClipRequest::new(&f.source, 10.0, 25.0);

    let (a, b) = tokio::join!(
        f.service.generate_clip(request.clone(), None),
        f.service.generate_clip(request.clone(), None)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a, b);
    assert_eq!(a.status, JobStatus::Completed);
    assert_eq!(a.encoder, Some(EncoderKind::Fallback));
    assert_eq!(a.size_bytes, 7);
    assert_eq!(f.engine_runs(), 1);
    assert_eq!(f.clips(), 1);
    assert_eq!(f.workspace_entries().await, 0);
}

#[tokio::test]
async fn test_cancel_leaves_no_artifacts() {
    let f = Fixture::new("exec sleep 30");
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let service = f.service.clone();
    let request = ClipRequest::new(&f.source, 10.0, 25.0);
    let task = tokio::spawn(async move { service.generate_clip_with_cancel(request, None, cancel_rx).await });

    // Wait for the engine to be running
    for _ in 0..100 {
        if f.engine_runs() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(f.engine_runs(), 1);
    cancel_tx.send_replace(true);

    let err = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("cancellation must be prompt")
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, WorkerError::Cancelled));
    assert_eq!(f.clips(), 0);
    assert_eq!(f.workspace_entries().await, 0);
    assert!(f.service.active_jobs().is_empty());
}

#[tokio::test]
async fn test_batch_reports_every_clip() {
    let f = Fixture::new("printf 'encoded' > \"$last\"");
    let scheduler = BatchScheduler::new(f.service.clone()).with_fallback_concurrency(2);

    let clips: Vec<BatchClip> = serde_json::from_value(serde_json::json!([
        {"start_time": 0.0, "end_time": 20.0},
        {"start_time": 30.0, "end_time": 200.0},
        {"start_time": 60.0, "end_time": 75.0, "options": {"format": "webm", "aspect_ratio": "square"}}
    ]))
    .unwrap();

    let report = scheduler.run(&f.source, &clips, None).await;

    assert_eq!(report.progress, 100);
    assert_eq!(report.status_of(0), Some(JobStatus::Completed));
    // Ends past the probed 120s duration
    assert_eq!(report.status_of(1), Some(JobStatus::Failed));
    assert_eq!(report.status_of(2), Some(JobStatus::Completed));
    assert_eq!(f.engine_runs(), 2);
    assert!(report.outcomes[&2]
        .result
        .as_ref()
        .unwrap()
        .payload
        .as_ref()
        .unwrap()
        .to_string_lossy()
        .ends_with(".webm"));
}
