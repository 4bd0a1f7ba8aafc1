//! Checkpointed step execution and the stage sequence.

mod checkpoint;
mod command;
mod context;
mod metrics;
mod runner;
mod stages;
pub mod tools;

pub use checkpoint::{clear_prior, has_succeeded, record_result, Checkpoint};
pub use command::{StepCommand, ToolSet};
pub use context::{MissingArtifact, OrthoImage, PipelineContext};
pub use metrics::{Metrics, MetricsSnapshot, StepOutcome, StepRecord};
pub use runner::{DryRunExecutor, StepError, StepExecutor, StepRunner};
pub use stages::{Pipeline, PipelineOutput};
pub use tools::{CommandError, ToolInvocation};
