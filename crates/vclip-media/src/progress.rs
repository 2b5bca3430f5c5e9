//! Progress reporting.
//!
//! FFmpeg's `-progress pipe:2` output is parsed into [`FfmpegProgress`];
//! every encoder reports percentages through a [`ProgressReporter`], which
//! clamps to 0-100 and never lets a job's progress move backwards.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).clamp(0.0, 100.0)
    }
}

/// Callback receiving whole-number percentages.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// A contiguous slice of a job's 0-100 progress range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseRange {
    pub start: f64,
    pub end: f64,
}

impl PhaseRange {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Map a fraction of this phase (0.0-1.0) onto the overall percentage.
    pub fn at(&self, fraction: f64) -> f64 {
        self.start + (self.end - self.start) * fraction.clamp(0.0, 1.0)
    }
}

/// Monotonic progress sink shared by every layer of one job.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressFn>,
    last: Arc<Mutex<Option<u8>>>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("current", &self.current())
            .finish()
    }
}

impl ProgressReporter {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        Self::from_callback(Some(Arc::new(callback)))
    }

    pub fn from_callback(callback: Option<ProgressFn>) -> Self {
        Self {
            callback,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Reporter that only tracks the current value.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Report a percentage; values below the last reported one are dropped.
    pub fn report(&self, percent: f64) {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0).floor() as u8
        } else {
            return;
        };

        // Callback runs under the lock so concurrent reporters cannot reorder it
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.map_or(true, |prev| percent > prev) {
            *last = Some(percent);
            if let Some(callback) = &self.callback {
                callback(percent);
            }
        }
    }

    /// Report progress within a phase.
    pub fn report_phase(&self, phase: PhaseRange, fraction: f64) {
        self.report(phase.at(fraction));
    }

    /// Last reported percentage (0 before the first report).
    pub fn current(&self) -> u8 {
        let last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        last.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };

        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert!((progress.percentage(5000) - 100.0).abs() < 0.01);
        assert!((progress.percentage(2500) - 100.0).abs() < 0.01);
        assert_eq!(progress.percentage(0), 0.0);
    }

    #[test]
    fn test_reporter_is_monotonic() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = ProgressReporter::new(move |p| sink.lock().unwrap().push(p));

        reporter.report(10.0);
        reporter.report(5.0);
        reporter.report(10.4);
        reporter.report(42.9);
        reporter.report(150.0);
        reporter.report(f64::NAN);

        assert_eq!(*seen.lock().unwrap(), vec![10, 42, 100]);
        assert_eq!(reporter.current(), 100);
    }

    #[test]
    fn test_phase_mapping() {
        let phase = PhaseRange::new(35.0, 90.0);
        assert!((phase.at(0.0) - 35.0).abs() < f64::EPSILON);
        assert!((phase.at(0.5) - 62.5).abs() < f64::EPSILON);
        assert!((phase.at(2.0) - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clones_share_state() {
        let reporter = ProgressReporter::silent();
        let clone = reporter.clone();
        clone.report(60.0);
        reporter.report(30.0);
        assert_eq!(reporter.current(), 60);
    }
}
