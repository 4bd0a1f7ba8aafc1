//! AOI Pipeline
//!
//! Checkpointed driver for a multi-stage satellite imagery pipeline over an
//! area of interest. Every stage is an external tool run as a child process;
//! the driver wires each stage's outputs into the next stage's inputs and
//! records per-step completion markers so an interrupted run resumes where
//! it stopped.
//!
//! # Architecture
//!
//! - **Index**: collation of vendor imagery files into complete acquisitions
//! - **I/O**: working directory, input scanning, discovery of tool outputs
//! - **Pipeline**: checkpoint store, step runner, tool commands, stage order
//!
//! # Usage
//!
//! ```no_run
//! use aoi_pipeline::{build_runtime, run_pipeline, Config, RunOptions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("aoi.yaml".as_ref())?;
//!     let runtime = build_runtime()?;
//!     runtime.block_on(run_pipeline(config, RunOptions::default()))?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crs;
pub mod index;
pub mod io;
pub mod pipeline;

pub use config::{Config, RunOptions};
pub use index::{Acquisition, AcquisitionKey, ImageryIndex};
pub use pipeline::{
    DryRunExecutor, Metrics, MetricsSnapshot, Pipeline, PipelineContext, StepError,
    StepExecutor, StepRunner, ToolSet,
};

use anyhow::Result;

/// Run summary written into the working directory after every run.
pub const SUMMARY_FILE: &str = "pipeline-summary.json";

/// Run the full pipeline with the given configuration.
///
/// The run summary is persisted whether or not the run succeeds.
pub async fn run_pipeline(config: Config, options: RunOptions) -> Result<MetricsSnapshot> {
    config.validate(&options)?;

    tracing::info!("Starting AOI pipeline for '{}'", config.aoi.name);
    if options.dry_run {
        tracing::info!("Dry run mode - no step will be executed");
    }

    let working_dir =
        io::create_working_dir(config.paths.work_dir.as_deref(), &config.paths.imagery_dir)?;
    let tools = ToolSet::from_config(&config.tools)?;
    tracing::debug!("Tools directory: {}", tools.tools_dir().display());

    let metrics = Metrics::new();
    let result = if options.dry_run {
        let executor = DryRunExecutor::new(metrics.clone());
        Pipeline::new(&config, options, tools, executor, working_dir.clone())
            .run()
            .await
    } else {
        let executor = StepRunner::new(metrics.clone()).with_exit_wait(config.params.exit_wait());
        Pipeline::new(&config, options, tools, executor, working_dir.clone())
            .run()
            .await
    };

    let snapshot = metrics.snapshot();
    if let Err(e) = snapshot.save_to_file(&working_dir.join(SUMMARY_FILE)) {
        tracing::warn!("Failed to save run summary: {:#}", e);
    }
    snapshot.print_summary();

    let output = result?;
    tracing::info!(
        "Pipeline complete over {} acquisitions: {}",
        output.acquisitions,
        snapshot
    );

    Ok(snapshot)
}

/// Build the Tokio runtime. Steps run one at a time, so a single thread
/// is enough.
pub fn build_runtime() -> Result<tokio::runtime::Runtime> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime)
}
