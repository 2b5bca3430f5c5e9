//! Multi-model analysis of a source file.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use vclip_analysis::{
    AnalysisRequest, MultiModelAnalysisCoordinator, ProviderConfig, ProviderRegistry, StatusFn,
};
use vclip_media::{extract_frames, FfprobeMediaProbe, MediaProbe};
use vclip_models::{AiProvider, AnalysisSettings, MultiModelAnalysis};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Probes a source, samples frames and runs every requested provider over them.
pub struct SourceAnalyzer {
    coordinator: MultiModelAnalysisCoordinator,
    probe: Arc<dyn MediaProbe>,
    frame_count: usize,
}

impl SourceAnalyzer {
    pub fn new(coordinator: MultiModelAnalysisCoordinator, probe: Arc<dyn MediaProbe>, frame_count: usize) -> Self {
        Self {
            coordinator,
            probe,
            frame_count,
        }
    }

    /// Register every provider that has an API key in the environment.
    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let mut provider_config = ProviderConfig::from_env();
        provider_config.request_timeout = config.provider_timeout;
        let registry = ProviderRegistry::from_config(&provider_config)?;

        info!(providers = ?registry.providers(), "Configured analysis providers");
        Ok(Self::new(
            MultiModelAnalysisCoordinator::new(registry),
            Arc::new(FfprobeMediaProbe),
            config.analysis_frames,
        ))
    }

    pub fn available_providers(&self) -> Vec<AiProvider> {
        self.coordinator.registry().providers()
    }

    /// Analyze `source` with `providers`, or with every configured provider when empty.
    pub async fn analyze(
        &self,
        source: &Path,
        providers: &[AiProvider],
        settings: AnalysisSettings,
        on_status: Option<StatusFn>,
    ) -> WorkerResult<MultiModelAnalysis> {
        let providers = if providers.is_empty() {
            self.available_providers()
        } else {
            providers.to_vec()
        };
        if providers.is_empty() {
            return Err(WorkerError::config_error(
                "no AI providers configured; set at least one provider API key",
            ));
        }

        let metadata = self.probe.probe(source).await?;
        let frames = extract_frames(source, metadata.duration, self.frame_count).await?;
        info!(
            source = %source.display(),
            duration = metadata.duration,
            frames = frames.len(),
            "Extracted analysis frames"
        );

        let request = AnalysisRequest::new(frames, metadata.duration, settings);
        Ok(self.coordinator.analyze_request(request, &providers, on_status).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::testing::{source_file, FakeProbe};
    use async_trait::async_trait;
    use vclip_analysis::{AnalysisResult, ProviderAdapter};
    use vclip_models::{Clip, ViralScoreBreakdown};

    struct FixedAdapter(AiProvider, f64);

    #[async_trait]
    impl ProviderAdapter for FixedAdapter {
        fn provider(&self) -> AiProvider {
            self.0
        }

        async fn analyze_frames(&self, request: &AnalysisRequest) -> AnalysisResult<Vec<Clip>> {
            assert!(request.frames.is_empty());
            Ok(vec![Clip {
                id: format!("{}_1", self.0.as_str()),
                title: "Moment".to_string(),
                reason: String::new(),
                start_time: self.1,
                end_time: self.1 + 15.0,
                viral_score: ViralScoreBreakdown::new(80, 70, 70, 70, 70),
                score_explanation: String::new(),
                audio_analysis: None,
            }])
        }
    }

    fn analyzer() -> SourceAnalyzer {
        let registry = ProviderRegistry::new()
            .with_adapter(Arc::new(FixedAdapter(AiProvider::Gemini, 10.0)))
            .with_adapter(Arc::new(FixedAdapter(AiProvider::Claude, 12.0)));
        SourceAnalyzer::new(
            MultiModelAnalysisCoordinator::new(registry),
            Arc::new(FakeProbe::new(120.0)),
            0,
        )
    }

    #[tokio::test]
    async fn test_defaults_to_every_configured_provider() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(&dir, 16);

        let analysis = analyzer()
            .analyze(&source, &[], AnalysisSettings::default(), None)
            .await
            .unwrap();

        assert_eq!(analysis.providers, vec![AiProvider::Gemini, AiProvider::Claude]);
        assert_eq!(analysis.aggregated_clips.len(), 1);
        assert_eq!(analysis.aggregated_clips[0].confidence_score, 100.0);
    }

    #[tokio::test]
    async fn test_no_providers_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(&dir, 16);
        let analyzer = SourceAnalyzer::new(
            MultiModelAnalysisCoordinator::new(ProviderRegistry::new()),
            Arc::new(FakeProbe::new(120.0)),
            0,
        );

        let err = analyzer
            .analyze(&source, &[], AnalysisSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::ConfigError(_)));
    }
}
