//! Provider configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use vclip_models::AiProvider;

/// Credentials and endpoint for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    /// API root, without a trailing slash
    pub base_url: String,
}

impl ProviderSettings {
    /// Defaults for a provider with the given key.
    pub fn for_provider(provider: AiProvider, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: default_model(provider).to_string(),
            base_url: default_base_url(provider).to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

pub fn default_model(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::Gemini => "gemini-2.5-flash",
        AiProvider::OpenAi => "gpt-4o",
        AiProvider::Claude => "claude-sonnet-4-20250514",
        AiProvider::Grok => "grok-2-vision-latest",
    }
}

pub fn default_base_url(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        AiProvider::OpenAi => "https://api.openai.com/v1",
        AiProvider::Claude => "https://api.anthropic.com/v1",
        AiProvider::Grok => "https://api.x.ai/v1",
    }
}

/// Environment variable holding each provider's API key.
pub fn api_key_var(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::Gemini => "GEMINI_API_KEY",
        AiProvider::OpenAi => "OPENAI_API_KEY",
        AiProvider::Claude => "ANTHROPIC_API_KEY",
        AiProvider::Grok => "XAI_API_KEY",
    }
}

fn model_var(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::Gemini => "GEMINI_MODEL",
        AiProvider::OpenAi => "OPENAI_MODEL",
        AiProvider::Claude => "CLAUDE_MODEL",
        AiProvider::Grok => "GROK_MODEL",
    }
}

fn base_url_var(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::Gemini => "GEMINI_BASE_URL",
        AiProvider::OpenAi => "OPENAI_BASE_URL",
        AiProvider::Claude => "ANTHROPIC_BASE_URL",
        AiProvider::Grok => "XAI_BASE_URL",
    }
}

/// Configured providers. A provider without an API key is absent.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub providers: BTreeMap<AiProvider, ProviderSettings>,
    /// Per-request timeout for provider calls
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ProviderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut providers = BTreeMap::new();
        for &provider in AiProvider::ALL {
            let Some(api_key) = std::env::var(api_key_var(provider))
                .ok()
                .filter(|k| !k.trim().is_empty())
            else {
                continue;
            };

            let mut settings = ProviderSettings::for_provider(provider, api_key);
            if let Ok(model) = std::env::var(model_var(provider)) {
                settings = settings.with_model(model);
            }
            if let Ok(base_url) = std::env::var(base_url_var(provider)) {
                settings = settings.with_base_url(base_url);
            }
            providers.insert(provider, settings);
        }

        Self {
            providers,
            request_timeout: Duration::from_secs(
                std::env::var("VCLIP_PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }

    pub fn with_provider(mut self, provider: AiProvider, settings: ProviderSettings) -> Self {
        self.providers.insert(provider, settings);
        self
    }

    pub fn is_configured(&self, provider: AiProvider) -> bool {
        self.providers.contains_key(&provider)
    }
}
