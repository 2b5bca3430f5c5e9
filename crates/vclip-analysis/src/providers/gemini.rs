//! Gemini `generateContent` adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vclip_models::{AiProvider, Clip};

use super::prompt::{build_prompt, parse_clips};
use super::send_json;
use crate::config::ProviderSettings;
use crate::error::{AnalysisError, AnalysisResult};
use crate::provider::{AnalysisRequest, ProviderAdapter};

pub struct GeminiAdapter {
    settings: ProviderSettings,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiAdapter {
    pub fn new(settings: ProviderSettings, client: Client) -> Self {
        Self { settings, client }
    }

    fn build_request(&self, request: &AnalysisRequest) -> GeminiRequest {
        let mut parts = vec![Part::Text {
            text: build_prompt(request),
        }];
        parts.extend(request.frames.iter().map(|frame| Part::Image {
            inline_data: InlineData {
                mime_type: frame.mime_type.clone(),
                data: frame.image_base64.clone(),
            },
        }));

        GeminiRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.4,
            },
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> AiProvider {
        AiProvider::Gemini
    }

    async fn analyze_frames(&self, request: &AnalysisRequest) -> AnalysisResult<Vec<Clip>> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.settings.base_url, self.settings.model, self.settings.api_key
        );
        debug!(model = %self.settings.model, frames = request.frames.len(), "Calling Gemini");

        let response: GeminiResponse = send_json(
            AiProvider::Gemini,
            self.client.post(&url).json(&self.build_request(request)),
        )
        .await?;

        let text = response
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AnalysisError::provider_failed(AiProvider::Gemini, "no content in response"))?;

        parse_clips(AiProvider::Gemini, &text, request.duration)
    }
}
