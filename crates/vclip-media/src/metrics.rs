//! Media pipeline metrics.

use metrics::{counter, histogram};

use vclip_models::EncoderKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const CLIPS_ENCODED_TOTAL: &str = "vclip_clips_encoded_total";
    pub const ENCODE_FAILURES_TOTAL: &str = "vclip_encode_failures_total";
    pub const ENCODE_DURATION_SECONDS: &str = "vclip_encode_duration_seconds";
    pub const ENGINE_INIT_TOTAL: &str = "vclip_engine_init_total";
}

/// Record a finished encode.
pub fn record_encode(encoder: EncoderKind, duration_secs: f64) {
    let labels = [("encoder", encoder.as_str().to_string())];
    counter!(names::CLIPS_ENCODED_TOTAL, &labels).increment(1);
    histogram!(names::ENCODE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a failed or cancelled encode.
pub fn record_encode_failure(encoder: EncoderKind, reason: &str) {
    let labels = [
        ("encoder", encoder.as_str().to_string()),
        ("reason", reason.to_string()),
    ];
    counter!(names::ENCODE_FAILURES_TOTAL, &labels).increment(1);
}

/// Record a fallback engine initialization attempt.
pub fn record_engine_init(source: &str, success: bool) {
    let labels = [
        ("source", source.to_string()),
        ("result", if success { "ok" } else { "error" }.to_string()),
    ];
    counter!(names::ENGINE_INIT_TOTAL, &labels).increment(1);
}
