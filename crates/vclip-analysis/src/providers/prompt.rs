//! Prompt construction and response parsing shared by every provider.

use serde::Deserialize;
use std::fmt::Write;

use vclip_models::{AiProvider, Clip, ViralScoreBreakdown};

use crate::error::{AnalysisError, AnalysisResult};
use crate::provider::AnalysisRequest;

/// Build the analysis prompt.
pub fn build_prompt(request: &AnalysisRequest) -> String {
    let settings = &request.settings;
    let mut prompt = format!(
        r#"You are an expert short-form video editor. The attached images are frames sampled from a {duration:.1} second video.

Identify up to {max_clips} moments most likely to go viral as standalone clips.
Each clip must be between {min:.0} and {max:.0} seconds long and lie within 0 and {duration:.1} seconds.
"#,
        duration = request.duration,
        max_clips = settings.max_clips,
        min = settings.min_clip_seconds,
        max = settings.max_clip_seconds,
    );

    if let Some(platform) = &settings.target_platform {
        let _ = writeln!(prompt, "Optimize the selection for {}.", platform);
    }

    if !request.frames.is_empty() {
        let timestamps = request
            .frames
            .iter()
            .map(|f| format!("{:.1}s", f.timestamp))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(prompt, "Frame timestamps, in order: {}.", timestamps);
    }

    if let Some(audio) = &request.audio_summary {
        let _ = writeln!(prompt, "\nAUDIO SUMMARY:\n{}", audio);
    }

    if let Some(custom) = &settings.custom_prompt {
        let _ = writeln!(prompt, "\nAdditional instructions:\n{}", custom);
    }

    prompt.push_str(
        r#"
Score every clip from 0 to 100 on overall viral potential, engagement, shareability, retention and trend alignment.

Return ONLY a single JSON object with this schema and nothing else:
{
  "clips": [
    {
      "title": "Short catchy title",
      "reason": "Why this moment works",
      "start_time": 0.0,
      "end_time": 0.0,
      "viral_score": {
        "overall": 0,
        "engagement": 0,
        "shareability": 0,
        "retention": 0,
        "trend": 0
      },
      "score_explanation": "What drives the score (hook, emotional peak, music, visual, surprise, timing)",
      "audio_analysis": "What the audio contributes"
    }
  ]
}
"#,
    );

    prompt
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawResponse {
    Wrapped { clips: Vec<RawClip> },
    Bare(Vec<RawClip>),
}

#[derive(Debug, Deserialize)]
struct RawClip {
    #[serde(default)]
    title: String,
    #[serde(default)]
    reason: String,
    #[serde(alias = "startTime", alias = "start")]
    start_time: Option<f64>,
    #[serde(alias = "endTime", alias = "end")]
    end_time: Option<f64>,
    #[serde(default, alias = "viralScore")]
    viral_score: RawScore,
    #[serde(default, alias = "scoreExplanation")]
    score_explanation: String,
    #[serde(default, alias = "audioAnalysis")]
    audio_analysis: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawScore {
    #[serde(default)]
    overall: f64,
    #[serde(default)]
    engagement: f64,
    #[serde(default)]
    shareability: f64,
    #[serde(default)]
    retention: f64,
    #[serde(default)]
    trend: f64,
}

impl RawScore {
    fn clamped(&self) -> ViralScoreBreakdown {
        ViralScoreBreakdown::new(
            clamp_score(self.overall),
            clamp_score(self.engagement),
            clamp_score(self.shareability),
            clamp_score(self.retention),
            clamp_score(self.trend),
        )
    }
}

fn clamp_score(value: f64) -> u8 {
    if value.is_finite() {
        value.round().clamp(0.0, 100.0) as u8
    } else {
        0
    }
}

/// Strip markdown code fences and any prose around the JSON payload.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```JSON"))
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text).trim();

    if text.starts_with('{') || text.starts_with('[') {
        return text;
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Parse a provider's text output into clips.
///
/// Scores are clamped to 0-100, end times past the source are clamped to
/// its duration, and clips with an empty or invalid range are dropped.
/// Clip ids are assigned as `{provider}_{n}`.
pub fn parse_clips(provider: AiProvider, text: &str, duration: f64) -> AnalysisResult<Vec<Clip>> {
    let raw: RawResponse = serde_json::from_str(extract_json(text))
        .map_err(|e| AnalysisError::provider_failed(provider, format!("unparseable response: {}", e)))?;
    let raw_clips = match raw {
        RawResponse::Wrapped { clips } => clips,
        RawResponse::Bare(clips) => clips,
    };

    let mut clips = Vec::with_capacity(raw_clips.len());
    for raw in raw_clips {
        let (Some(start), Some(mut end)) = (raw.start_time, raw.end_time) else {
            continue;
        };
        if duration.is_finite() && duration > 0.0 && end > duration {
            end = duration;
        }

        let mut clip = Clip {
            id: String::new(),
            title: raw.title.trim().to_string(),
            reason: raw.reason.trim().to_string(),
            start_time: start,
            end_time: end,
            viral_score: raw.viral_score.clamped(),
            score_explanation: raw.score_explanation.trim().to_string(),
            audio_analysis: raw.audio_analysis.filter(|a| !a.trim().is_empty()),
        };
        if !clip.has_valid_range() {
            continue;
        }

        clip.id = format!("{}_{}", provider.as_str(), clips.len() + 1);
        if clip.title.is_empty() {
            clip.title = format!("Clip {}", clips.len() + 1);
        }
        clips.push(clip);
    }

    Ok(clips)
}
