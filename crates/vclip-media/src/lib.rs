#![deny(unreachable_patterns)]
//! Media probing and clip encoding.
//!
//! This crate provides:
//! - Metadata probing over ffprobe JSON
//! - Two [`ClipEncoder`] backends: the in-process fast path and the
//!   sandboxed FFmpeg fallback engine
//! - Type-safe FFmpeg command building with `-progress pipe:2` parsing
//! - Prompt cancellation via tokio watch channels
//! - Frame extraction for multi-model analysis

pub mod capabilities;
pub mod command;
pub mod encoder;
pub mod error;
pub mod fallback;
pub mod fast_path;
pub mod filters;
pub mod frames;
pub mod fs_utils;
pub mod metrics;
pub mod probe;
pub mod progress;

pub use capabilities::EnvironmentCapabilities;
pub use command::{FfmpegCommand, FfmpegRunner};
pub use encoder::{ClipEncoder, EncodeJob, EncodedClip};
pub use error::{MediaError, MediaResult};
pub use fallback::{EngineConfig, EngineHandle, EngineSource, FallbackEncoder, FallbackEngine};
pub use fast_path::{FastPathEncoder, FastPathPlan};
pub use frames::{extract_frames, frame_timestamps};
pub use probe::{probe_metadata, FfprobeMediaProbe, MediaProbe};
pub use progress::{FfmpegProgress, PhaseRange, ProgressFn, ProgressReporter};
