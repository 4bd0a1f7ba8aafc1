//! Durable per-step completion markers.
//!
//! Each step leaves two files in its working directory:
//!
//! ```text
//! <step>.log                 merged stdout/stderr of the last attempt
//! <step>.exitstatus.<code>   empty marker, suffix is the exit code
//! ```
//!
//! Only the `.exitstatus.0` marker means "done"; the log is diagnostic.

use anyhow::{Context, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};

/// Marker and log locations for one (working directory, step) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    working_dir: PathBuf,
    step_name: String,
}

impl Checkpoint {
    pub fn new(working_dir: impl Into<PathBuf>, step_name: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            step_name: step_name.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Captured output of the step.
    pub fn log_path(&self) -> PathBuf {
        self.working_dir.join(format!("{}.log", self.step_name))
    }

    /// Marker file for a given exit code.
    pub fn marker_path(&self, exit_code: i32) -> PathBuf {
        self.working_dir
            .join(format!("{}.exitstatus.{}", self.step_name, exit_code))
    }

    /// Whether a previous attempt of this step exited with code 0.
    pub fn has_succeeded(&self) -> bool {
        self.marker_path(0).is_file()
    }

    /// Persist the exit code of an attempt.
    pub fn record_result(&self, exit_code: i32) -> Result<()> {
        let marker = self.marker_path(exit_code);
        std::fs::File::create(&marker)
            .with_context(|| format!("Failed to write marker: {}", marker.display()))?;
        Ok(())
    }

    /// Remove every marker (whatever its code) and the log of this step.
    pub fn clear_prior(&self) -> Result<()> {
        let log = self.log_path();
        if log.is_file() {
            std::fs::remove_file(&log)
                .with_context(|| format!("Failed to remove stale log: {}", log.display()))?;
        }

        for marker in self.existing_markers()? {
            std::fs::remove_file(&marker)
                .with_context(|| format!("Failed to remove stale marker: {}", marker.display()))?;
        }
        Ok(())
    }

    /// Marker files currently on disk for this step.
    pub fn existing_markers(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/{}.exitstatus.*",
            Pattern::escape(&self.working_dir.to_string_lossy()),
            Pattern::escape(&self.step_name)
        );

        let mut markers = Vec::new();
        for entry in glob::glob(&pattern).with_context(|| format!("Invalid marker pattern: {}", pattern))? {
            markers.push(entry.context("Failed to read marker entry")?);
        }
        Ok(markers)
    }

    /// Exit code recorded by the last attempt, if any.
    pub fn recorded_exit_code(&self) -> Result<Option<i32>> {
        let prefix = format!("{}.exitstatus.", self.step_name);
        Ok(self
            .existing_markers()?
            .iter()
            .filter_map(|m| m.file_name()?.to_str()?.strip_prefix(&prefix)?.parse().ok())
            .next())
    }
}

/// Whether the step already succeeded in `working_dir`.
pub fn has_succeeded(working_dir: &Path, step_name: &str) -> bool {
    Checkpoint::new(working_dir, step_name).has_succeeded()
}

/// Persist the exit code of an attempt of `step_name`.
pub fn record_result(working_dir: &Path, step_name: &str, exit_code: i32) -> Result<()> {
    Checkpoint::new(working_dir, step_name).record_result(exit_code)
}

/// Remove all markers and the log of `step_name`.
pub fn clear_prior(working_dir: &Path, step_name: &str) -> Result<()> {
    Checkpoint::new(working_dir, step_name).clear_prior()
}
