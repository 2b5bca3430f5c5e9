//! Analysis metrics.

use metrics::{counter, histogram};

use vclip_models::AiProvider;

pub mod names {
    pub const PROVIDER_CALLS_TOTAL: &str = "vclip_provider_calls_total";
    pub const PROVIDER_CALL_DURATION_SECONDS: &str = "vclip_provider_call_duration_seconds";
    pub const CONSENSUS_SCORE: &str = "vclip_consensus_score";
}

/// Record one provider invocation.
pub fn record_provider_call(provider: AiProvider, success: bool, duration_secs: f64) {
    let labels = [
        ("provider", provider.as_str().to_string()),
        ("result", if success { "ok" } else { "error" }.to_string()),
    ];
    counter!(names::PROVIDER_CALLS_TOTAL, &labels).increment(1);
    histogram!(names::PROVIDER_CALL_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_consensus(score: f64) {
    histogram!(names::CONSENSUS_SCORE).record(score);
}
