//! End-to-end analysis against mocked provider endpoints.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vclip_analysis::{
    AnalysisError, MultiModelAnalysisCoordinator, ProviderConfig, ProviderRegistry, ProviderSettings,
};
use vclip_models::{AiProvider, AnalysisSettings, ExtractedFrame};

fn frames() -> Vec<ExtractedFrame> {
    (0..3)
        .map(|i| ExtractedFrame {
            timestamp: 10.0 + i as f64 * 20.0,
            image_base64: "aGVsbG8=".to_string(),
            mime_type: "image/jpeg".to_string(),
        })
        .collect()
}

async fn gemini_server(body: serde_json::Value, status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

async fn chat_server(body: serde_json::Value, status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

fn gemini_reply(clips: serde_json::Value) -> serde_json::Value {
    json!({"candidates": [{"content": {"parts": [{"text": json!({"clips": clips}).to_string()}]}}]})
}

fn chat_reply(clips: serde_json::Value) -> serde_json::Value {
    json!({"choices": [{"message": {"content": json!({"clips": clips}).to_string()}}]})
}

fn coordinator(gemini: &MockServer, openai: &MockServer, grok: &MockServer) -> MultiModelAnalysisCoordinator {
    let config = ProviderConfig::default()
        .with_provider(
            AiProvider::Gemini,
            ProviderSettings::for_provider(AiProvider::Gemini, "g-key")
                .with_model("gemini-test")
                .with_base_url(gemini.uri()),
        )
        .with_provider(
            AiProvider::OpenAi,
            ProviderSettings::for_provider(AiProvider::OpenAi, "o-key").with_base_url(openai.uri()),
        )
        .with_provider(
            AiProvider::Grok,
            ProviderSettings::for_provider(AiProvider::Grok, "x-key").with_base_url(grok.uri()),
        );
    MultiModelAnalysisCoordinator::new(ProviderRegistry::from_config(&config).unwrap())
}

#[tokio::test]
async fn test_three_providers_reach_consensus() {
    let gemini = gemini_server(
        gemini_reply(json!([
            {"title": "The reveal", "reason": "strong hook", "start_time": 20, "end_time": 40,
             "viral_score": {"overall": 90, "engagement": 85, "shareability": 80, "retention": 75, "trend": 70},
             "score_explanation": "Great hook with emotional payoff"},
            {"title": "Outro", "start_time": 100, "end_time": 115, "viral_score": {"overall": 55}}
        ])),
        200,
    )
    .await;
    let openai = chat_server(
        chat_reply(json!([
            {"title": "The reveal", "start_time": 22, "end_time": 38,
             "viral_score": {"overall": 80, "engagement": 75, "shareability": 70, "retention": 70, "trend": 60},
             "score_explanation": "Hook lands in the first seconds"}
        ])),
        200,
    )
    .await;
    let grok = chat_server(json!({"error": "overloaded"}), 503).await;

    let analysis = coordinator(&gemini, &openai, &grok)
        .analyze(
            frames(),
            120.0,
            &[AiProvider::Gemini, AiProvider::OpenAi, AiProvider::Grok],
            AnalysisSettings::default(),
        )
        .await
        .unwrap();

    assert_eq!(analysis.provider_results.len(), 2);
    assert!(analysis.provider_errors[&AiProvider::Grok].contains("503"));
    assert_eq!(analysis.aggregated_clips.len(), 2);

    let top = &analysis.aggregated_clips[0];
    assert_eq!(top.title, "The reveal");
    assert_eq!(top.start_time, 20.0);
    assert_eq!(top.end_time, 40.0);
    assert_eq!(top.recommended_by.len(), 2);
    assert!(top.score_explanation.starts_with("Key viral factors: hook"));
    assert!(top.aggregated_viral_score.overall > 80 && top.aggregated_viral_score.overall < 90);

    let solo = &analysis.aggregated_clips[1];
    assert_eq!(solo.title, "Outro");
    assert_eq!(solo.recommended_by.len(), 1);

    assert!(analysis.consensus_score > 0.0 && analysis.consensus_score <= 100.0);
}

#[tokio::test]
async fn test_every_provider_failing() {
    let gemini = gemini_server(json!({"error": "bad key"}), 401).await;
    let openai = chat_server(json!({"error": "bad key"}), 401).await;
    let grok = chat_server(json!({"error": "bad key"}), 401).await;

    let err = coordinator(&gemini, &openai, &grok)
        .analyze(
            frames(),
            120.0,
            &[AiProvider::Gemini, AiProvider::OpenAi, AiProvider::Grok],
            AnalysisSettings::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::AllProvidersFailed(_)));
    let msg = err.to_string();
    assert!(msg.contains("Gemini"));
    assert!(msg.contains("Grok"));
}
