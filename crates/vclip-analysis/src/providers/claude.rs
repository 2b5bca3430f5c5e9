//! Anthropic Messages adapter.

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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

pub struct ClaudeAdapter {
    settings: ProviderSettings,
    client: Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Image { source: ImageSource },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ClaudeAdapter {
    pub fn new(settings: ProviderSettings, client: Client) -> Self {
        Self { settings, client }
    }

    fn build_request(&self, request: &AnalysisRequest) -> MessagesRequest {
        // Images first, then the instructions
        let mut content: Vec<ContentBlock> = request
            .frames
            .iter()
            .map(|frame| ContentBlock::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: frame.mime_type.clone(),
                    data: frame.image_base64.clone(),
                },
            })
            .collect();
        content.push(ContentBlock::Text {
            text: build_prompt(request),
        });

        MessagesRequest {
            model: self.settings.model.clone(),
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content,
            }],
        }
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeAdapter {
    fn provider(&self) -> AiProvider {
        AiProvider::Claude
    }

    async fn analyze_frames(&self, request: &AnalysisRequest) -> AnalysisResult<Vec<Clip>> {
        let url = format!("{}/messages", self.settings.base_url);
        debug!(model = %self.settings.model, frames = request.frames.len(), "Calling Claude");

        let response: MessagesResponse = send_json(
            AiProvider::Claude,
            self.client
                .post(&url)
                .header("x-api-key", &self.settings.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&self.build_request(request)),
        )
        .await?;

        let text: String = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();
        if text.trim().is_empty() {
            return Err(AnalysisError::provider_failed(AiProvider::Claude, "no text in response"));
        }

        parse_clips(AiProvider::Claude, &text, request.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vclip_models::AnalysisSettings;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_messages_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "anthropic-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "text", "text": "{\"clips\":[{\"title\":\"Callback\",\"start_time\":12,\"end_time\":30,"},
                    {"type": "text", "text": "\"viral_score\":{\"overall\":77,\"engagement\":70}}]}"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let settings = ProviderSettings::for_provider(AiProvider::Claude, "anthropic-test").with_base_url(server.uri());
        let adapter = ClaudeAdapter::new(settings, Client::new());
        let request = AnalysisRequest::new(Vec::new(), 60.0, AnalysisSettings::default());

        let clips = adapter.analyze_frames(&request).await.unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].viral_score.overall, 77);
        assert_eq!(clips[0].viral_score.engagement, 70);
    }

    #[test]
    fn test_images_precede_text() {
        let request = AnalysisRequest::new(
            vec![vclip_models::ExtractedFrame {
                timestamp: 2.0,
                image_base64: "QUJD".to_string(),
                mime_type: "image/jpeg".to_string(),
            }],
            10.0,
            AnalysisSettings::default(),
        );
        let settings = ProviderSettings::for_provider(AiProvider::Claude, "k");
        let body = serde_json::to_value(ClaudeAdapter::new(settings, Client::new()).build_request(&request)).unwrap();

        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(body["max_tokens"], 4096);
    }
}
