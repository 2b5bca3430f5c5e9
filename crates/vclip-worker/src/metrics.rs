//! Generation service metrics.

use metrics::{counter, histogram};

use vclip_models::EncoderKind;

pub mod names {
    pub const CLIPS_GENERATED_TOTAL: &str = "vclip_clips_generated_total";
    pub const GENERATION_FAILURES_TOTAL: &str = "vclip_generation_failures_total";
    pub const GENERATION_DURATION_SECONDS: &str = "vclip_generation_duration_seconds";
    pub const FAST_PATH_RETRIES_TOTAL: &str = "vclip_fast_path_fallback_retries_total";
    pub const DEDUP_JOINS_TOTAL: &str = "vclip_dedup_joins_total";
    pub const BATCH_CLIPS_TOTAL: &str = "vclip_batch_clips_total";
}

pub fn record_generated(encoder: EncoderKind, duration_secs: f64) {
    let labels = [("encoder", encoder.as_str().to_string())];
    counter!(names::CLIPS_GENERATED_TOTAL, &labels).increment(1);
    histogram!(names::GENERATION_DURATION_SECONDS, &labels).record(duration_secs);
}

/// `reason` is one of "cancelled", "invalid" or "failed".
pub fn record_generation_failure(reason: &'static str) {
    counter!(names::GENERATION_FAILURES_TOTAL, "reason" => reason).increment(1);
}

pub fn record_fast_path_retry() {
    counter!(names::FAST_PATH_RETRIES_TOTAL).increment(1);
}

pub fn record_dedup_join() {
    counter!(names::DEDUP_JOINS_TOTAL).increment(1);
}

pub fn record_batch_clip(success: bool) {
    counter!(names::BATCH_CLIPS_TOTAL, "result" => if success { "ok" } else { "error" }).increment(1);
}
