//! Host capability detection for encoder selection.

use serde::{Deserialize, Serialize};
use tracing::info;

use vclip_models::OutputFormat;

/// Native encode/decode primitives available to this process.
///
/// Computed once at startup and handed to the generation service, so
/// encoder selection never probes the environment itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentCapabilities {
    /// Containers the in-process encoder can produce
    pub native_formats: Vec<OutputFormat>,
    /// Encoder names backing `native_formats`, for diagnostics
    pub native_encoders: Vec<String>,
}

impl EnvironmentCapabilities {
    /// No native primitives: everything goes to the fallback engine.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_native_formats(formats: impl IntoIterator<Item = OutputFormat>) -> Self {
        Self {
            native_formats: formats.into_iter().collect(),
            native_encoders: Vec::new(),
        }
    }

    pub fn has_native_codecs(&self) -> bool {
        !self.native_formats.is_empty()
    }

    /// Whether the fast path can encode this container at all.
    pub fn supports_fast_path(&self, format: OutputFormat) -> bool {
        self.native_formats.contains(&format)
    }

    /// Probe the running process.
    pub fn detect() -> Self {
        let caps = detect_native();
        info!(
            native_formats = ?caps.native_formats,
            native_encoders = ?caps.native_encoders,
            "Detected encoder capabilities"
        );
        caps
    }
}

#[cfg(feature = "native-encoder")]
fn detect_native() -> EnvironmentCapabilities {
    crate::fast_path::native::detect_capabilities()
}

#[cfg(not(feature = "native-encoder"))]
fn detect_native() -> EnvironmentCapabilities {
    EnvironmentCapabilities::none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_has_no_fast_path() {
        let caps = EnvironmentCapabilities::none();
        assert!(!caps.has_native_codecs());
        assert!(!caps.supports_fast_path(OutputFormat::Mp4));
    }

    #[test]
    fn test_format_specific_support() {
        let caps = EnvironmentCapabilities::with_native_formats([OutputFormat::Mp4]);
        assert!(caps.supports_fast_path(OutputFormat::Mp4));
        assert!(!caps.supports_fast_path(OutputFormat::Webm));
    }

    #[cfg(not(feature = "native-encoder"))]
    #[test]
    fn test_detect_without_native_support() {
        assert_eq!(EnvironmentCapabilities::detect(), EnvironmentCapabilities::none());
    }
}
