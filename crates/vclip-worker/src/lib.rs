//! Clip generation worker.
//!
//! This crate provides:
//! - `ClipGenerationService`: encoder selection, per-request deduplication
//!   and the one-time fast path to fallback retry
//! - `BatchScheduler`: many clips from one source under a fallback concurrency cap
//! - `SourceAnalyzer`: frame sampling plus multi-model consensus analysis
//! - Worker configuration and structured job logging

pub mod analysis;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod metrics;

pub use analysis::SourceAnalyzer;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use generation::{BatchScheduler, ClipGenerationService, JobRegistry};
pub use logging::JobLogger;
