//! Error types for multi-model analysis.

use thiserror::Error;
use vclip_models::AiProvider;

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// One provider's call failed. Recorded by the coordinator, never fatal on its own.
    #[error("{provider} failed: {message}")]
    ProviderFailure { provider: AiProvider, message: String },

    /// Every invoked provider failed.
    #[error("All providers failed: {0}")]
    AllProvidersFailed(String),

    #[error("No providers requested")]
    NoProviders,

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    pub fn provider_failed(provider: AiProvider, message: impl Into<String>) -> Self {
        Self::ProviderFailure {
            provider,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Failure reason without the provider prefix.
    pub fn reason(&self) -> String {
        match self {
            AnalysisError::ProviderFailure { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Combine per-provider failures into one error.
    pub fn all_failed<'a, I>(failures: I) -> Self
    where
        I: IntoIterator<Item = (&'a AiProvider, &'a String)>,
    {
        let combined = failures
            .into_iter()
            .map(|(provider, reason)| format!("{}: {}", provider.display_name(), reason))
            .collect::<Vec<_>>()
            .join("; ");
        Self::AllProvidersFailed(combined)
    }
}
