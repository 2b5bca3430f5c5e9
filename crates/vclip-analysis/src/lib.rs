//! Multi-model clip analysis.
//!
//! Sends sampled frames to several AI providers concurrently, matches the
//! clips they propose by time overlap and merges agreeing clips into a
//! ranked consensus list.

pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod providers;
pub mod similarity;

pub use config::{ProviderConfig, ProviderSettings};
pub use consensus::{ConsensusAggregator, ConsensusOutcome, CONSENSUS_AGREEMENT_WEIGHT};
pub use coordinator::{MultiModelAnalysisCoordinator, StatusFn};
pub use error::{AnalysisError, AnalysisResult};
pub use provider::{build_adapter, AnalysisRequest, ProviderAdapter, ProviderRegistry};
pub use similarity::{overlap_percent, ClipSimilarityMatcher, DEFAULT_SIMILARITY_THRESHOLD};
