//! Consensus aggregation over similar clips.
//!
//! Similar clips are grouped, each group is merged into one
//! [`AggregatedClip`], and the run as a whole gets a consensus score built
//! from how often providers agreed on a moment and how closely their scores
//! for it matched.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use vclip_models::{
    AggregatedClip, AiProvider, Clip, ClipSimilarity, ClipVariation, ProviderClip, ViralScoreBreakdown,
};

/// Weight of the agreement term in the consensus score; the consistency term gets the rest.
pub const CONSENSUS_AGREEMENT_WEIGHT: f64 = 0.5;

/// Viral-relevant keywords looked for in score explanations.
pub const EXPLANATION_KEYWORDS: &[&str] = &[
    "engagement",
    "shareability",
    "retention",
    "trend",
    "hook",
    "emotional peak",
    "music",
    "visual",
    "surprise",
    "timing",
];

/// Aggregated clips plus the whole-run consensus score.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusOutcome {
    /// Best first
    pub clips: Vec<AggregatedClip>,
    pub consensus_score: f64,
}

/// Merges overlapping clip proposals from several providers.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusAggregator {
    agreement_weight: f64,
}

impl Default for ConsensusAggregator {
    fn default() -> Self {
        Self::new(CONSENSUS_AGREEMENT_WEIGHT)
    }
}

impl ConsensusAggregator {
    pub fn new(agreement_weight: f64) -> Self {
        Self {
            agreement_weight: agreement_weight.clamp(0.0, 1.0),
        }
    }

    /// Group, merge and score.
    ///
    /// `providers_invoked` counts every provider that was asked, including
    /// ones that failed; it is the denominator of each clip's confidence.
    pub fn aggregate(
        &self,
        results: &BTreeMap<AiProvider, Vec<Clip>>,
        similarities: &[ClipSimilarity],
        providers_invoked: usize,
    ) -> ConsensusOutcome {
        let groups = group_clips(results, similarities);

        let mut clips: Vec<AggregatedClip> = groups
            .iter()
            .enumerate()
            .map(|(i, group)| merge_group(format!("consensus_{}", i + 1), group, providers_invoked))
            .collect();

        clips.sort_by(|a, b| {
            b.aggregated_viral_score
                .overall
                .cmp(&a.aggregated_viral_score.overall)
                .then_with(|| b.confidence_score.total_cmp(&a.confidence_score))
        });

        let consensus_score = self.consensus_score(similarities.len(), results, &groups);
        ConsensusOutcome { clips, consensus_score }
    }

    /// Whole-run agreement, 0-100.
    ///
    /// Agreement is the similarity edge count relative to the average number
    /// of clips per succeeded provider, capped at 100. Consistency is the
    /// mean over groups of `100 - stddev(overall)`. Zero when there are no
    /// edges or no groups.
    pub fn consensus_score(
        &self,
        edge_count: usize,
        results: &BTreeMap<AiProvider, Vec<Clip>>,
        groups: &[Vec<ProviderClip>],
    ) -> f64 {
        if edge_count == 0 || groups.is_empty() || results.is_empty() {
            return 0.0;
        }

        let clip_total: usize = results.values().map(Vec::len).sum();
        let avg_clips = clip_total as f64 / results.len() as f64;
        if avg_clips <= 0.0 {
            return 0.0;
        }
        let agreement = (edge_count as f64 / avg_clips * 100.0).min(100.0);

        let consistency = groups
            .iter()
            .map(|group| {
                let scores: Vec<f64> = group.iter().map(|pc| pc.clip.viral_score.overall as f64).collect();
                (100.0 - population_variance(&scores).sqrt()).max(0.0)
            })
            .sum::<f64>()
            / groups.len() as f64;

        let score = self.agreement_weight * agreement + (1.0 - self.agreement_weight) * consistency;
        score.clamp(0.0, 100.0)
    }
}

/// Form groups of similar clips.
///
/// Edges are visited in order. An edge whose endpoints are both ungrouped
/// seeds a group; every other edge touching one of the two seed clips folds
/// its far endpoint in if that clip is still ungrouped. Clips reached only
/// through a folded clip are not pulled in, so grouping is not transitive.
/// Every clip left over becomes a singleton group.
pub fn group_clips(
    results: &BTreeMap<AiProvider, Vec<Clip>>,
    similarities: &[ClipSimilarity],
) -> Vec<Vec<ProviderClip>> {
    let mut grouped: HashSet<(AiProvider, &str)> = HashSet::new();
    let mut groups = Vec::new();

    for edge in similarities {
        let seed = (edge.first.key(), edge.second.key());
        if grouped.contains(&seed.0) || grouped.contains(&seed.1) {
            continue;
        }

        grouped.insert(seed.0);
        grouped.insert(seed.1);
        let mut group = vec![edge.first.clone(), edge.second.clone()];

        for other in similarities {
            let (x, y) = (other.first.key(), other.second.key());
            let far = if x == seed.0 || x == seed.1 {
                &other.second
            } else if y == seed.0 || y == seed.1 {
                &other.first
            } else {
                continue;
            };
            if grouped.insert(far.key()) {
                group.push(far.clone());
            }
        }

        groups.push(group);
    }

    for (&provider, clips) in results {
        for clip in clips {
            if grouped.insert((provider, clip.id.as_str())) {
                groups.push(vec![ProviderClip::new(provider, clip.clone())]);
            }
        }
    }

    groups
}

fn merge_group(id: String, group: &[ProviderClip], providers_invoked: usize) -> AggregatedClip {
    let best = best_clip(group);

    let start_time = group.iter().map(|pc| pc.clip.start_time).fold(f64::INFINITY, f64::min);
    let end_time = group.iter().map(|pc| pc.clip.end_time).fold(f64::NEG_INFINITY, f64::max);

    let title = most_common(group.iter().map(|pc| pc.clip.title.as_str()), &best.title);
    let reason = most_common(group.iter().map(|pc| pc.clip.reason.as_str()), &best.reason);

    let scores: Vec<ViralScoreBreakdown> = group.iter().map(|pc| pc.clip.viral_score).collect();
    let explanations: Vec<&str> = group.iter().map(|pc| pc.clip.score_explanation.as_str()).collect();

    let recommended_by: BTreeSet<AiProvider> = group.iter().map(|pc| pc.provider).collect();
    let confidence_score = (recommended_by.len() as f64 / providers_invoked.max(1) as f64 * 100.0).min(100.0);

    let mut variations = BTreeMap::new();
    for pc in group {
        variations.entry(pc.provider).or_insert_with(|| ClipVariation {
            title: pc.clip.title.clone(),
            reason: pc.clip.reason.clone(),
            viral_score: pc.clip.viral_score,
        });
    }

    AggregatedClip {
        id,
        title,
        reason,
        start_time,
        end_time,
        aggregated_viral_score: weighted_score(&scores),
        score_explanation: synthesize_explanation(&explanations, &best.score_explanation),
        audio_analysis: best
            .audio_analysis
            .clone()
            .or_else(|| group.iter().find_map(|pc| pc.clip.audio_analysis.clone())),
        recommended_by,
        confidence_score,
        variations,
    }
}

/// Highest `overall` score, earliest on ties.
fn best_clip(group: &[ProviderClip]) -> &Clip {
    let mut best = &group[0].clip;
    for pc in &group[1..] {
        if pc.clip.viral_score.overall > best.viral_score.overall {
            best = &pc.clip;
        }
    }
    best
}

/// Most frequent non-empty value; ties go to `preferred` when it is among them.
fn most_common<'a>(values: impl Iterator<Item = &'a str>, preferred: &str) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values.filter(|v| !v.is_empty()) {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let Some(max) = counts.iter().map(|(_, c)| *c).max() else {
        return preferred.to_string();
    };
    if counts.iter().any(|(v, c)| *v == preferred && *c == max) {
        return preferred.to_string();
    }
    counts
        .iter()
        .find(|(_, c)| *c == max)
        .map(|(v, _)| v.to_string())
        .unwrap_or_else(|| preferred.to_string())
}

/// Per-field mean weighted by `overall / 100`.
///
/// Falls back to the plain mean when every weight is zero. Fields are rounded.
pub fn weighted_score(scores: &[ViralScoreBreakdown]) -> ViralScoreBreakdown {
    if scores.is_empty() {
        return ViralScoreBreakdown::default();
    }

    let weights: Vec<f64> = scores.iter().map(|s| s.overall as f64 / 100.0).collect();
    let total_weight: f64 = weights.iter().sum();

    let mut fields = [0u8; 5];
    for (i, slot) in fields.iter_mut().enumerate() {
        let value = if total_weight > 0.0 {
            scores
                .iter()
                .zip(&weights)
                .map(|(s, w)| s.fields()[i] as f64 * w)
                .sum::<f64>()
                / total_weight
        } else {
            scores.iter().map(|s| s.fields()[i] as f64).sum::<f64>() / scores.len() as f64
        };
        *slot = value.round().clamp(0.0, 100.0) as u8;
    }

    ViralScoreBreakdown::from_fields(fields)
}

/// Summarize the keywords most contributors mention, then quote the best explanation.
pub fn synthesize_explanation(explanations: &[&str], best_explanation: &str) -> String {
    let lowered: Vec<String> = explanations.iter().map(|e| e.to_lowercase()).collect();
    let contributors = lowered.len();

    let shared: Vec<&str> = EXPLANATION_KEYWORDS
        .iter()
        .copied()
        .filter(|keyword| {
            let hits = lowered.iter().filter(|e| e.contains(keyword)).count();
            contributors > 0 && hits * 2 >= contributors
        })
        .collect();

    let best = best_explanation.trim();
    if shared.is_empty() {
        return if best.is_empty() {
            "Multi-model analysis found this moment notable.".to_string()
        } else {
            format!("Multi-model analysis: {}", best)
        };
    }

    let summary = format!("Key viral factors: {}.", join_keywords(&shared));
    if best.is_empty() {
        summary
    } else {
        format!("{} {}", summary, best)
    }
}

fn join_keywords(keywords: &[&str]) -> String {
    match keywords {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}
