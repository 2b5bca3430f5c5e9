//! Source media descriptors.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Container/stream metadata for a source file. Produced once per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaMetadata {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    pub has_audio: bool,
    /// Frame rate (fps)
    #[serde(default)]
    pub fps: f64,
    /// Video codec name as reported by the demuxer
    #[serde(default)]
    pub codec: String,
    /// File size in bytes
    #[serde(default)]
    pub size_bytes: u64,
}

/// Identity of a source file as seen on disk.
///
/// Two requests against the same path only deduplicate while the file is
/// unchanged, so size and modification time are part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct SourceIdentity {
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_unix_ms: Option<u64>,
}

impl SourceIdentity {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, modified_unix_ms: Option<u64>) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            modified_unix_ms,
        }
    }
}
