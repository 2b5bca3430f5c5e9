//! Fallback encoding through a sandboxed FFmpeg engine.

mod encoder;
mod engine;

pub use encoder::FallbackEncoder;
pub use engine::{EngineConfig, EngineHandle, EngineSource, FallbackEngine};
