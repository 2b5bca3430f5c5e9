//! Lazy, memoized loading of the fallback transcoding engine.
//!
//! The engine binary is resolved from an ordered list of sources: an explicit
//! path, the local cache directory, the system `PATH`, then HTTP mirrors. Each
//! source is bounded by its own timeout and a failing source advances to the
//! next one. Concurrent callers share a single in-flight load; a failed load
//! resets the state so a later call starts over.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::metrics::record_engine_init;

/// Fallback engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Binary to use before any other source
    pub explicit_path: Option<PathBuf>,
    /// Directory holding a cached (or downloaded) engine binary
    pub cache_dir: PathBuf,
    /// Whether to look the engine up on `PATH`
    pub use_system_path: bool,
    /// Download URLs tried in order after local sources
    pub mirrors: Vec<String>,
    /// Upper bound for each source attempt
    pub source_timeout: Duration,
    /// Root under which the engine's private workspace is created
    pub work_root: PathBuf,
    /// File name of the engine binary
    pub binary_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let root = std::env::temp_dir().join("vclip");
        Self {
            explicit_path: None,
            cache_dir: root.join("engine-cache"),
            use_system_path: true,
            mirrors: Vec::new(),
            source_timeout: Duration::from_secs(30),
            work_root: root,
            binary_name: "ffmpeg".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            explicit_path: std::env::var("VCLIP_ENGINE_PATH").ok().map(PathBuf::from),
            cache_dir: std::env::var("VCLIP_ENGINE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            use_system_path: std::env::var("VCLIP_ENGINE_USE_PATH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            mirrors: std::env::var("VCLIP_ENGINE_MIRRORS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            source_timeout: Duration::from_secs(
                std::env::var("VCLIP_ENGINE_SOURCE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            work_root: std::env::var("VCLIP_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_root),
            binary_name: defaults.binary_name,
        }
    }

    /// Sources in priority order.
    pub fn sources(&self) -> Vec<EngineSource> {
        let mut sources = Vec::new();
        if let Some(path) = &self.explicit_path {
            sources.push(EngineSource::Explicit(path.clone()));
        }
        sources.push(EngineSource::Cache(self.cache_dir.join(&self.binary_name)));
        if self.use_system_path {
            sources.push(EngineSource::SystemPath);
        }
        sources.extend(self.mirrors.iter().cloned().map(EngineSource::Mirror));
        sources
    }
}

/// Where an engine binary may come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSource {
    Explicit(PathBuf),
    Cache(PathBuf),
    SystemPath,
    Mirror(String),
}

impl EngineSource {
    /// Short label for logs and error reports.
    pub fn label(&self) -> String {
        match self {
            EngineSource::Explicit(path) => format!("explicit:{}", path.display()),
            EngineSource::Cache(path) => format!("cache:{}", path.display()),
            EngineSource::SystemPath => "system-path".to_string(),
            EngineSource::Mirror(url) => format!("mirror:{}", url),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            EngineSource::Explicit(_) => "explicit",
            EngineSource::Cache(_) => "cache",
            EngineSource::SystemPath => "system_path",
            EngineSource::Mirror(_) => "mirror",
        }
    }
}

/// A loaded engine and its private workspace.
#[derive(Debug)]
pub struct EngineHandle {
    binary: PathBuf,
    source: String,
    version: String,
    workspace: TempDir,
}

impl EngineHandle {
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Label of the source the binary was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// First line of `-version` output.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Engine-private directory shared by all jobs; file names must be job-unique.
    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }
}

/// Cloneable load failure shared by every caller waiting on one load.
#[derive(Debug, Clone)]
struct LoadFailure {
    message: String,
    attempted: Vec<String>,
}

impl From<LoadFailure> for MediaError {
    fn from(failure: LoadFailure) -> Self {
        MediaError::initialization_failed(failure.message, failure.attempted)
    }
}

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<EngineHandle>, LoadFailure>>>;

enum LoadState {
    Idle,
    Loading { generation: u64, future: LoadFuture },
    Ready(Arc<EngineHandle>),
}

/// Process-wide fallback engine with memoized initialization.
pub struct FallbackEngine {
    config: EngineConfig,
    http: reqwest::Client,
    state: Mutex<LoadState>,
    generation: Mutex<u64>,
}

impl FallbackEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            state: Mutex::new(LoadState::Idle),
            generation: Mutex::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether a load has completed successfully.
    pub fn is_ready(&self) -> bool {
        matches!(*self.lock_state(), LoadState::Ready(_))
    }

    /// Return the loaded engine, loading it first if needed.
    pub async fn get_or_init(&self) -> MediaResult<Arc<EngineHandle>> {
        let (generation, future) = {
            let mut state = self.lock_state();
            match &*state {
                LoadState::Ready(handle) => return Ok(handle.clone()),
                LoadState::Loading { generation, future } => (*generation, future.clone()),
                LoadState::Idle => {
                    let generation = self.next_generation();
                    let future = load(self.config.clone(), self.http.clone()).boxed().shared();
                    *state = LoadState::Loading {
                        generation,
                        future: future.clone(),
                    };
                    (generation, future)
                }
            }
        };

        let result = future.await;

        let mut state = self.lock_state();
        let current = matches!(&*state, LoadState::Loading { generation: g, .. } if *g == generation);
        if current {
            *state = match &result {
                Ok(handle) => LoadState::Ready(handle.clone()),
                Err(_) => LoadState::Idle,
            };
        }

        result.map_err(MediaError::from)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_generation(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation += 1;
        *generation
    }
}

async fn load(config: EngineConfig, http: reqwest::Client) -> Result<Arc<EngineHandle>, LoadFailure> {
    let mut attempted = Vec::new();
    let mut last_error = "no engine sources configured".to_string();

    for source in config.sources() {
        let label = source.label();
        attempted.push(label.clone());
        debug!(source = %label, "Trying fallback engine source");

        let outcome = tokio::time::timeout(config.source_timeout, resolve(&source, &config, &http)).await;
        let binary = match outcome {
            Ok(Ok(binary)) => binary,
            Ok(Err(e)) => {
                warn!(source = %label, error = %e, "Fallback engine source failed");
                record_engine_init(source.kind(), false);
                last_error = e.to_string();
                continue;
            }
            Err(_) => {
                warn!(
                    source = %label,
                    timeout_secs = config.source_timeout.as_secs(),
                    "Fallback engine source timed out"
                );
                record_engine_init(source.kind(), false);
                last_error = format!("{} timed out", label);
                continue;
            }
        };

        let version = match verify(&binary).await {
            Ok(version) => version,
            Err(e) => {
                warn!(source = %label, error = %e, "Fallback engine failed verification");
                record_engine_init(source.kind(), false);
                last_error = e.to_string();
                continue;
            }
        };

        let workspace = create_workspace(&config.work_root).map_err(|e| LoadFailure {
            message: format!("failed to create engine workspace: {}", e),
            attempted: attempted.clone(),
        })?;

        record_engine_init(source.kind(), true);
        info!(
            source = %label,
            binary = %binary.display(),
            version = %version,
            workspace = %workspace.path().display(),
            "Fallback engine ready"
        );

        return Ok(Arc::new(EngineHandle {
            binary,
            source: label,
            version,
            workspace,
        }));
    }

    Err(LoadFailure {
        message: last_error,
        attempted,
    })
}

async fn resolve(source: &EngineSource, config: &EngineConfig, http: &reqwest::Client) -> MediaResult<PathBuf> {
    match source {
        EngineSource::Explicit(path) | EngineSource::Cache(path) => {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                Ok(path.clone())
            } else {
                Err(MediaError::FileNotFound(path.clone()))
            }
        }
        EngineSource::SystemPath => which::which(&config.binary_name)
            .map_err(|e| MediaError::download_failed(format!("{} not on PATH: {}", config.binary_name, e))),
        EngineSource::Mirror(url) => download(url, config, http).await,
    }
}

/// Download a mirror's binary into the cache directory.
async fn download(url: &str, config: &EngineConfig, http: &reqwest::Client) -> MediaResult<PathBuf> {
    tokio::fs::create_dir_all(&config.cache_dir).await?;

    let mut response = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| MediaError::download_failed(format!("{}: {}", url, e)))?;

    // Stream into a temp file next to the final path, then rename into place
    let partial = tempfile::Builder::new()
        .prefix(".engine-download-")
        .tempfile_in(&config.cache_dir)?
        .into_temp_path();
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| MediaError::download_failed(format!("{}: {}", url, e)))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    if written == 0 {
        return Err(MediaError::download_failed(format!("{}: empty response", url)));
    }

    make_executable(&partial)?;
    let target = config.cache_dir.join(&config.binary_name);
    partial
        .persist(&target)
        .map_err(|e| MediaError::Io(e.error))?;

    debug!(url, bytes = written, target = %target.display(), "Downloaded fallback engine");
    Ok(target)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> MediaResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> MediaResult<()> {
    Ok(())
}

/// Run `<binary> -version` and return the first line.
async fn verify(binary: &Path) -> MediaResult<String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| MediaError::download_failed(format!("{} is not runnable: {}", binary.display(), e)))?;

    if !output.status.success() {
        return Err(MediaError::download_failed(format!(
            "{} -version exited with {:?}",
            binary.display(),
            output.status.code()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

fn create_workspace(root: &Path) -> std::io::Result<TempDir> {
    std::fs::create_dir_all(root)?;
    tempfile::Builder::new().prefix("engine-").tempdir_in(root)
}
