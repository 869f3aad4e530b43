//! Build orchestration for DocSmith.
//!
//! This crate ties together source acquisition, layout detection, builder
//! dispatch and publishing into one [`Pipeline`], and runs pipelines in the
//! background through the [`TaskCoordinator`].

pub mod coordinator;
pub mod pipeline;

pub use coordinator::{
    BuildHandle, BuildOutcome, CompletionEvent, CoordinatorOptions, TaskCoordinator,
};
pub use pipeline::{BuildArtifact, BuildRequest, Pipeline, ProgressReporter, SilentProgress};
