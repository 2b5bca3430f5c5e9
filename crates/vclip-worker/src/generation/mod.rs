//! Clip generation: the service, its in-flight registry and the batch scheduler.

mod batch;
mod registry;
mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::BatchScheduler;
pub use registry::{Acquired, FailureKind, JobFailure, JobHandle, JobLease, JobOutcome, JobRegistry};
pub use service::{select_encoder, ClipGenerationService};
