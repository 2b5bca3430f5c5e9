//! Batch generation outcomes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::job::{GenerationResult, JobStatus};
use crate::options::ClipOptions;

/// One clip of a batch: a time range within the shared source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchClip {
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub options: ClipOptions,
}

impl BatchClip {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Outcome of a single clip within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchClipOutcome {
    /// Position of the clip in the submitted batch
    pub index: usize,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-clip outcomes of a batch, keyed by submission index.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BatchReport {
    pub outcomes: BTreeMap<usize, BatchClipOutcome>,
    /// Final batch progress; 100 once every clip has settled
    pub progress: u8,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| o.status == JobStatus::Completed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| o.status == JobStatus::Failed)
            .count()
    }

    pub fn status_of(&self, index: usize) -> Option<JobStatus> {
        self.outcomes.get(&index).map(|o| o.status)
    }
}
