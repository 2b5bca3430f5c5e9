//! Cross-provider clip overlap.

use std::collections::BTreeMap;

use vclip_models::{AiProvider, Clip, ClipSimilarity, ProviderClip};

/// Default minimum overlap, in percent of the shorter clip.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 50.0;

/// Overlap of two clips as a percentage of the shorter one.
///
/// Disjoint clips yield 0, never a negative value.
pub fn overlap_percent(a: &Clip, b: &Clip) -> f64 {
    let intersection = (a.end_time.min(b.end_time) - a.start_time.max(b.start_time)).max(0.0);
    let shorter = a.duration().min(b.duration());
    if shorter <= 0.0 || !shorter.is_finite() {
        return 0.0;
    }
    (intersection / shorter * 100.0).clamp(0.0, 100.0)
}

/// Finds pairs of clips from different providers that cover the same moment.
#[derive(Debug, Clone, Copy)]
pub struct ClipSimilarityMatcher {
    threshold: f64,
}

impl Default for ClipSimilarityMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl ClipSimilarityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// All cross-provider pairs at or above the threshold.
    ///
    /// Providers are visited in declaration order and clips in the order each
    /// provider returned them, so the edge order is deterministic.
    pub fn find_similarities(&self, results: &BTreeMap<AiProvider, Vec<Clip>>) -> Vec<ClipSimilarity> {
        let providers: Vec<(&AiProvider, &Vec<Clip>)> = results.iter().collect();
        let mut similarities = Vec::new();

        for (i, (first_provider, first_clips)) in providers.iter().enumerate() {
            for (second_provider, second_clips) in &providers[i + 1..] {
                for a in first_clips.iter() {
                    for b in second_clips.iter() {
                        let overlap = overlap_percent(a, b);
                        if overlap >= self.threshold {
                            similarities.push(ClipSimilarity {
                                first: ProviderClip::new(**first_provider, a.clone()),
                                second: ProviderClip::new(**second_provider, b.clone()),
                                overlap_percent: overlap,
                            });
                        }
                    }
                }
            }
        }

        similarities
    }
}
