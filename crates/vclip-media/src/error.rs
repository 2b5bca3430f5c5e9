//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during probing and encoding.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The host lacks the native codec primitives an encoder needs.
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// Every source for the fallback engine was tried and none produced a usable binary.
    #[error("Fallback engine initialization failed after trying {}: {message}", attempted.join(", "))]
    InitializationFailure {
        message: String,
        attempted: Vec<String>,
    },

    /// Codec error while a job was running.
    #[error("Encode failed: {message}")]
    EncodeFailure {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedEnvironment(message.into())
    }

    /// Create an encode failure without process details.
    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self::EncodeFailure {
            message: message.into(),
            stderr: None,
            exit_code: None,
        }
    }

    /// Create an encode failure from a finished engine process.
    pub fn engine_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::EncodeFailure {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn initialization_failed(message: impl Into<String>, attempted: Vec<String>) -> Self {
        Self::InitializationFailure {
            message: message.into(),
            attempted,
        }
    }

    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }

    /// Whether a fast path failure may be retried on the fallback engine.
    ///
    /// Everything except cancellation qualifies.
    pub fn allows_fallback(&self) -> bool {
        !self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_failure_lists_sources() {
        let err = MediaError::initialization_failed(
            "no usable engine",
            vec!["cache".to_string(), "https://mirror.example/ffmpeg".to_string()],
        );
        let msg = err.to_string();
        assert!(msg.contains("cache"));
        assert!(msg.contains("mirror.example"));
    }

    #[test]
    fn test_fallback_classification() {
        assert!(!MediaError::Cancelled.allows_fallback());
        assert!(MediaError::encode_failed("decoder rejected stream").allows_fallback());
        assert!(MediaError::unsupported("no h264 encoder").allows_fallback());
        assert!(MediaError::Timeout(30).allows_fallback());
    }
}
