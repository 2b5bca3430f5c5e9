//! HTTP provider adapters.

mod claude;
mod gemini;
mod openai;
pub mod prompt;

pub use claude::ClaudeAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiCompatibleAdapter;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use vclip_models::AiProvider;

use crate::error::{AnalysisError, AnalysisResult};

/// Longest error body carried into a failure message.
const MAX_ERROR_BODY: usize = 300;

/// Send a request and decode a JSON body, mapping every failure to a provider failure.
async fn send_json<T: DeserializeOwned>(provider: AiProvider, request: RequestBuilder) -> AnalysisResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| AnalysisError::provider_failed(provider, format!("request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AnalysisError::provider_failed(
            provider,
            format!("API returned {}: {}", status, truncate(body.trim(), MAX_ERROR_BODY)),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| AnalysisError::provider_failed(provider, format!("failed to decode response: {}", e)))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
