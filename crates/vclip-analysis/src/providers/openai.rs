//! OpenAI-compatible chat completions adapter, shared by OpenAI and Grok.

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

pub struct OpenAiCompatibleAdapter {
    provider: AiProvider,
    settings: ProviderSettings,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleAdapter {
    pub fn new(provider: AiProvider, settings: ProviderSettings, client: Client) -> Self {
        Self {
            provider,
            settings,
            client,
        }
    }

    fn build_request(&self, request: &AnalysisRequest) -> ChatRequest {
        let mut content = vec![ContentPart::Text {
            text: build_prompt(request),
        }];
        content.extend(request.frames.iter().map(|frame| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", frame.mime_type, frame.image_base64),
            },
        }));

        ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![Message {
                role: "user",
                content,
            }],
            temperature: 0.4,
            response_format: ResponseFormat { kind: "json_object" },
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn provider(&self) -> AiProvider {
        self.provider
    }

    async fn analyze_frames(&self, request: &AnalysisRequest) -> AnalysisResult<Vec<Clip>> {
        let url = format!("{}/chat/completions", self.settings.base_url);
        debug!(
            provider = %self.provider,
            model = %self.settings.model,
            frames = request.frames.len(),
            "Calling chat completions"
        );

        let response: ChatResponse = send_json(
            self.provider,
            self.client
                .post(&url)
                .bearer_auth(&self.settings.api_key)
                .json(&self.build_request(request)),
        )
        .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AnalysisError::provider_failed(self.provider, "no content in response"))?;

        parse_clips(self.provider, &text, request.duration)
    }
}
