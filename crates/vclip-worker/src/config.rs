//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sources at or above this size never take the fast path
    pub fast_path_max_bytes: u64,
    /// Batch clips up to this length are routed to the fast path
    pub fast_path_max_clip_secs: f64,
    /// Concurrent fallback engine jobs within one batch
    pub fallback_concurrency: usize,
    /// Work directory; encoded clips land in `<work_dir>/clips`
    pub work_dir: PathBuf,
    /// Upper bound for one fallback engine run
    pub encode_timeout: Duration,
    /// Per-request timeout for AI provider calls
    pub provider_timeout: Duration,
    /// Frames sampled from a source for analysis
    pub analysis_frames: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            fast_path_max_bytes: 500 * 1024 * 1024,
            fast_path_max_clip_secs: 30.0,
            fallback_concurrency: 2,
            work_dir: std::env::temp_dir().join("vclip"),
            encode_timeout: Duration::from_secs(1800), // 30 minutes
            provider_timeout: Duration::from_secs(120),
            analysis_frames: 12,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fast_path_max_bytes: env_parse("VCLIP_FAST_PATH_MAX_BYTES").unwrap_or(defaults.fast_path_max_bytes),
            fast_path_max_clip_secs: env_parse("VCLIP_FAST_PATH_MAX_CLIP_SECS")
                .unwrap_or(defaults.fast_path_max_clip_secs),
            fallback_concurrency: env_parse::<usize>("VCLIP_FALLBACK_CONCURRENCY")
                .map(|n| n.max(1))
                .unwrap_or(defaults.fallback_concurrency),
            work_dir: std::env::var("VCLIP_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            encode_timeout: env_parse("VCLIP_ENCODE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.encode_timeout),
            provider_timeout: env_parse("VCLIP_PROVIDER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            analysis_frames: env_parse("VCLIP_ANALYSIS_FRAMES").unwrap_or(defaults.analysis_frames),
        }
    }

    /// Directory encoded clips are delivered to.
    pub fn output_dir(&self) -> PathBuf {
        self.work_dir.join("clips")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
