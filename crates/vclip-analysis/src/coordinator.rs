//! Runs every requested provider concurrently and aggregates what comes back.

use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use vclip_models::{AiProvider, AnalysisSettings, Clip, ExtractedFrame, MultiModelAnalysis, ProviderStatus};

use crate::consensus::ConsensusAggregator;
use crate::error::{AnalysisError, AnalysisResult};
use crate::metrics::{record_consensus, record_provider_call};
use crate::provider::{AnalysisRequest, ProviderRegistry};
use crate::similarity::ClipSimilarityMatcher;

/// Per-provider lifecycle callback.
pub type StatusFn = Arc<dyn Fn(AiProvider, ProviderStatus) + Send + Sync>;

pub struct MultiModelAnalysisCoordinator {
    registry: ProviderRegistry,
    matcher: ClipSimilarityMatcher,
    aggregator: ConsensusAggregator,
}

impl MultiModelAnalysisCoordinator {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            matcher: ClipSimilarityMatcher::default(),
            aggregator: ConsensusAggregator::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: ClipSimilarityMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_aggregator(mut self, aggregator: ConsensusAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn analyze(
        &self,
        frames: Vec<ExtractedFrame>,
        duration: f64,
        providers: &[AiProvider],
        settings: AnalysisSettings,
    ) -> AnalysisResult<MultiModelAnalysis> {
        self.analyze_request(AnalysisRequest::new(frames, duration, settings), providers, None)
            .await
    }

    /// Invoke every provider, then group and score their clips.
    ///
    /// One provider's failure never affects the others. The call fails only
    /// when every provider failed.
    pub async fn analyze_request(
        &self,
        request: AnalysisRequest,
        providers: &[AiProvider],
        on_status: Option<StatusFn>,
    ) -> AnalysisResult<MultiModelAnalysis> {
        let mut seen = HashSet::new();
        let providers: Vec<AiProvider> = providers.iter().copied().filter(|p| seen.insert(*p)).collect();
        if providers.is_empty() {
            return Err(AnalysisError::NoProviders);
        }

        let request = Arc::new(request);
        let emit = |provider: AiProvider, status: ProviderStatus| {
            if let Some(callback) = &on_status {
                callback(provider, status);
            }
        };

        let calls = providers.iter().map(|&provider| {
            let adapter = self.registry.get(provider);
            let request = request.clone();
            let emit = &emit;
            async move {
                emit(provider, ProviderStatus::Started);
                let started = Instant::now();

                let result = match adapter {
                    Some(adapter) => adapter.analyze_frames(&request).await,
                    None => Err(AnalysisError::provider_failed(provider, "provider not configured")),
                };

                record_provider_call(provider, result.is_ok(), started.elapsed().as_secs_f64());
                match &result {
                    Ok(clips) => {
                        info!(provider = %provider, clips = clips.len(), "Provider analysis completed");
                        emit(provider, ProviderStatus::Completed);
                    }
                    Err(e) => {
                        warn!(provider = %provider, error = %e, "Provider analysis failed");
                        emit(provider, ProviderStatus::Failed);
                    }
                }
                (provider, result)
            }
        });

        let mut provider_results: BTreeMap<AiProvider, Vec<Clip>> = BTreeMap::new();
        let mut provider_errors: BTreeMap<AiProvider, String> = BTreeMap::new();
        for (provider, result) in join_all(calls).await {
            match result {
                Ok(clips) => {
                    provider_results.insert(provider, with_unique_ids(provider, clips));
                }
                Err(e) => {
                    provider_errors.insert(provider, e.reason());
                }
            }
        }

        if provider_results.is_empty() {
            return Err(AnalysisError::all_failed(&provider_errors));
        }

        let similarities = self.matcher.find_similarities(&provider_results);
        let outcome = self
            .aggregator
            .aggregate(&provider_results, &similarities, providers.len());
        record_consensus(outcome.consensus_score);

        info!(
            providers = providers.len(),
            succeeded = provider_results.len(),
            similarities = similarities.len(),
            aggregated = outcome.clips.len(),
            consensus_score = outcome.consensus_score,
            "Multi-model analysis complete"
        );

        Ok(MultiModelAnalysis {
            providers,
            aggregated_clips: outcome.clips,
            provider_results,
            provider_errors,
            consensus_score: outcome.consensus_score,
        })
    }
}

/// Drop clips with invalid ranges and make ids unique within one provider.
fn with_unique_ids(provider: AiProvider, clips: Vec<Clip>) -> Vec<Clip> {
    let mut seen = HashSet::new();
    clips
        .into_iter()
        .filter(Clip::has_valid_range)
        .enumerate()
        .map(|(i, mut clip)| {
            if clip.id.is_empty() || !seen.insert(clip.id.clone()) {
                let mut n = i + 1;
                loop {
                    let candidate = format!("{}_{}", provider.as_str(), n);
                    if seen.insert(candidate.clone()) {
                        clip.id = candidate;
                        break;
                    }
                    n += 1;
                }
            }
            clip
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderAdapter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use vclip_models::ViralScoreBreakdown;

    struct FakeAdapter {
        provider: AiProvider,
        outcome: Result<Vec<Clip>, String>,
    }

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn provider(&self) -> AiProvider {
            self.provider
        }

        async fn analyze_frames(&self, _request: &AnalysisRequest) -> AnalysisResult<Vec<Clip>> {
            self.outcome
                .clone()
                .map_err(|msg| AnalysisError::provider_failed(self.provider, msg))
        }
    }

    /// Never answers; flags when its in-flight call is dropped.
    struct HangingAdapter {
        dropped: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ProviderAdapter for HangingAdapter {
        fn provider(&self) -> AiProvider {
            AiProvider::Claude
        }

        async fn analyze_frames(&self, _request: &AnalysisRequest) -> AnalysisResult<Vec<Clip>> {
            let _flag = SetOnDrop(self.dropped.clone());
            std::future::pending::<AnalysisResult<Vec<Clip>>>().await
        }
    }

    fn clip(id: &str, start: f64, end: f64, overall: u8) -> Clip {
        Clip {
            id: id.to_string(),
            title: id.to_string(),
            reason: String::new(),
            start_time: start,
            end_time: end,
            viral_score: ViralScoreBreakdown::new(overall, 70, 70, 70, 70),
            score_explanation: String::new(),
            audio_analysis: None,
        }
    }

    fn registry(adapters: Vec<FakeAdapter>) -> ProviderRegistry {
        adapters
            .into_iter()
            .fold(ProviderRegistry::new(), |r, a| r.with_adapter(Arc::new(a)))
    }

    #[tokio::test]
    async fn test_partial_failure_is_recorded() {
        let coordinator = MultiModelAnalysisCoordinator::new(registry(vec![
            FakeAdapter {
                provider: AiProvider::Gemini,
                outcome: Ok(vec![clip("g", 10.0, 30.0, 90)]),
            },
            FakeAdapter {
                provider: AiProvider::OpenAi,
                outcome: Err("HTTP 500".to_string()),
            },
            FakeAdapter {
                provider: AiProvider::Claude,
                outcome: Ok(vec![clip("c", 12.0, 28.0, 80)]),
            },
        ]));

        let analysis = coordinator
            .analyze(
                Vec::new(),
                60.0,
                &[AiProvider::Gemini, AiProvider::OpenAi, AiProvider::Claude],
                AnalysisSettings::default(),
            )
            .await
            .unwrap();

        assert_eq!(analysis.providers.len(), 3);
        assert_eq!(analysis.provider_results.len(), 2);
        assert_eq!(analysis.provider_errors[&AiProvider::OpenAi], "HTTP 500");
        assert_eq!(analysis.aggregated_clips.len(), 1);

        let top = &analysis.aggregated_clips[0];
        assert_eq!(top.recommended_by.len(), 2);
        assert!((top.confidence_score - 200.0 / 3.0).abs() < 1e-9);
        assert!(analysis.consensus_score > 0.0 && analysis.consensus_score <= 100.0);
    }

    #[tokio::test]
    async fn test_all_failed_combines_reasons() {
        let coordinator = MultiModelAnalysisCoordinator::new(registry(vec![FakeAdapter {
            provider: AiProvider::Grok,
            outcome: Err("invalid key".to_string()),
        }]));

        let err = coordinator
            .analyze(Vec::new(), 60.0, &[AiProvider::Grok, AiProvider::Claude], AnalysisSettings::default())
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, AnalysisError::AllProvidersFailed(_)));
        assert!(msg.contains("Grok: invalid key"));
        assert!(msg.contains("Claude: provider not configured"));
    }

    #[tokio::test]
    async fn test_status_callbacks() {
        let coordinator = MultiModelAnalysisCoordinator::new(registry(vec![
            FakeAdapter {
                provider: AiProvider::Gemini,
                outcome: Ok(vec![clip("g", 0.0, 15.0, 50)]),
            },
            FakeAdapter {
                provider: AiProvider::Claude,
                outcome: Err("boom".to_string()),
            },
        ]));

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let on_status: StatusFn = Arc::new(move |p: AiProvider, s: ProviderStatus| sink.lock().unwrap().push((p, s)));

        coordinator
            .analyze_request(
                AnalysisRequest::new(Vec::new(), 30.0, AnalysisSettings::default()),
                &[AiProvider::Gemini, AiProvider::Claude],
                Some(on_status),
            )
            .await
            .unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert!(events.contains(&(AiProvider::Gemini, ProviderStatus::Started)));
        assert!(events.contains(&(AiProvider::Gemini, ProviderStatus::Completed)));
        assert!(events.contains(&(AiProvider::Claude, ProviderStatus::Started)));
        assert!(events.contains(&(AiProvider::Claude, ProviderStatus::Failed)));
    }

    #[tokio::test]
    async fn test_no_providers() {
        let coordinator = MultiModelAnalysisCoordinator::new(ProviderRegistry::new());
        let err = coordinator
            .analyze(Vec::new(), 10.0, &[], AnalysisSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoProviders));
    }

    #[tokio::test]
    async fn test_dropping_analysis_drops_provider_calls() {
        let dropped = Arc::new(AtomicBool::new(false));
        let coordinator = MultiModelAnalysisCoordinator::new(
            ProviderRegistry::new().with_adapter(Arc::new(HangingAdapter { dropped: dropped.clone() })),
        );

        let analysis = coordinator.analyze(Vec::new(), 60.0, &[AiProvider::Claude], AnalysisSettings::default());
        assert!(tokio::time::timeout(Duration::from_millis(50), analysis).await.is_err());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unique_ids() {
        let clips = vec![clip("dup", 0.0, 5.0, 1), clip("dup", 5.0, 9.0, 1), clip("bad", 9.0, 3.0, 1)];
        let ids: Vec<_> = with_unique_ids(AiProvider::OpenAi, clips)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["dup".to_string(), "openai_2".to_string()]);
    }

    #[test]
    fn test_renamed_id_skips_taken_ids() {
        let clips = vec![clip("openai_3", 0.0, 5.0, 1), clip("a", 5.0, 9.0, 1), clip("a", 10.0, 14.0, 1)];
        let ids: Vec<_> = with_unique_ids(AiProvider::OpenAi, clips)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["openai_3".to_string(), "a".to_string(), "openai_4".to_string()]);
    }

    #[tokio::test]
    async fn test_colliding_ids_all_reach_aggregation() {
        let coordinator = MultiModelAnalysisCoordinator::new(registry(vec![FakeAdapter {
            provider: AiProvider::OpenAi,
            outcome: Ok(vec![
                clip("openai_3", 0.0, 10.0, 80),
                clip("a", 20.0, 30.0, 70),
                clip("a", 40.0, 50.0, 60),
            ]),
        }]));

        let analysis = coordinator
            .analyze(Vec::new(), 60.0, &[AiProvider::OpenAi], AnalysisSettings::default())
            .await
            .unwrap();

        assert_eq!(analysis.aggregated_clips.len(), 3);
    }
}
