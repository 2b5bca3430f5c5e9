//! The provider adapter seam and the typed registry of adapters.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use vclip_models::{AiProvider, AnalysisSettings, Clip, ExtractedFrame};

use crate::config::{ProviderConfig, ProviderSettings};
use crate::error::{AnalysisError, AnalysisResult};
use crate::providers::{ClaudeAdapter, GeminiAdapter, OpenAiCompatibleAdapter};

/// Input handed to every provider in one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub frames: Vec<ExtractedFrame>,
    /// Source duration in seconds
    pub duration: f64,
    pub settings: AnalysisSettings,
    /// Free-text description of the soundtrack, if one was produced upstream
    pub audio_summary: Option<String>,
}

impl AnalysisRequest {
    pub fn new(frames: Vec<ExtractedFrame>, duration: f64, settings: AnalysisSettings) -> Self {
        Self {
            frames,
            duration,
            settings,
            audio_summary: None,
        }
    }

    pub fn with_audio_summary(mut self, summary: impl Into<String>) -> Self {
        self.audio_summary = Some(summary.into());
        self
    }
}

/// One AI provider.
///
/// Transport, authentication and response-format failures are reported as
/// [`AnalysisError::ProviderFailure`]. Adapters do not retry.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> AiProvider;

    async fn analyze_frames(&self, request: &AnalysisRequest) -> AnalysisResult<Vec<Clip>>;
}

/// Build the HTTP adapter for a provider.
pub fn build_adapter(
    provider: AiProvider,
    settings: ProviderSettings,
    client: reqwest::Client,
) -> Arc<dyn ProviderAdapter> {
    match provider {
        AiProvider::Gemini => Arc::new(GeminiAdapter::new(settings, client)),
        AiProvider::OpenAi => Arc::new(OpenAiCompatibleAdapter::new(AiProvider::OpenAi, settings, client)),
        AiProvider::Claude => Arc::new(ClaudeAdapter::new(settings, client)),
        AiProvider::Grok => Arc::new(OpenAiCompatibleAdapter::new(AiProvider::Grok, settings, client)),
    }
}

/// Adapters keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: BTreeMap<AiProvider, Arc<dyn ProviderAdapter>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register HTTP adapters for every configured provider.
    pub fn from_config(config: &ProviderConfig) -> AnalysisResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AnalysisError::config_error(format!("failed to build HTTP client: {}", e)))?;

        let mut registry = Self::new();
        for (&provider, settings) in &config.providers {
            registry.register(build_adapter(provider, settings.clone(), client.clone()));
        }
        Ok(registry)
    }

    /// Add an adapter, replacing any previous one for the same provider.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider: AiProvider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// Registered providers in declaration order.
    pub fn providers(&self) -> Vec<AiProvider> {
        self.adapters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
