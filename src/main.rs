//! AOI Pipeline CLI
//!
//! Runs the processing pipeline on an AOI from start to finish.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aoi_pipeline::{build_runtime, run_pipeline, Config, RunOptions};

#[derive(Parser)]
#[command(name = "aoi-pipeline")]
#[command(about = "Run the AOI processing pipeline from start to finish", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or JSON)
    config: PathBuf,

    /// Run the VisSat stereo pipeline to produce the point cloud first
    #[arg(long)]
    vissat: bool,

    /// Score the outputs against reference data at the end
    #[arg(long, alias = "run_metrics")]
    run_metrics: bool,

    /// Print every step's command and whether it would run, without running it
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn options(&self) -> RunOptions {
        RunOptions {
            vissat: self.vissat,
            run_metrics: self.run_metrics,
            dry_run: self.dry_run,
        }
    }
}

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the tools' own output
    let filter = EnvFilter::try_from_env("LOGLEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    match run_command(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_command(cli: &Cli) -> Result<()> {
    let config = Config::from_file(&cli.config)?;

    let runtime = build_runtime()?;
    runtime.block_on(run_pipeline(config, cli.options()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_config() {
        assert!(Cli::try_parse_from(["aoi-pipeline"]).is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["aoi-pipeline", "aoi.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("aoi.yaml"));
        assert_eq!(cli.options(), RunOptions::default());
    }

    #[test]
    fn test_cli_flags() {
        let cli =
            Cli::try_parse_from(["aoi-pipeline", "aoi.yaml", "--vissat", "--run-metrics"]).unwrap();
        assert!(cli.vissat);
        assert!(cli.run_metrics);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_run_metrics_underscore_alias() {
        let cli = Cli::try_parse_from(["aoi-pipeline", "--run_metrics", "aoi.ini"]).unwrap();
        assert!(cli.run_metrics);
    }

    #[test]
    fn test_cli_dry_run() {
        let cli = Cli::try_parse_from(["aoi-pipeline", "aoi.yaml", "--dry-run"]).unwrap();
        assert!(cli.options().dry_run);
    }
}
