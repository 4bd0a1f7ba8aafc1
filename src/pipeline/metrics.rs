//! Per-step outcome and timing collection.

use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// What happened to one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepOutcome {
    /// Exited with code 0
    Succeeded,

    /// Already completed by an earlier run
    Skipped,

    /// Exited with a non-zero code
    Failed { exit_code: i32 },

    /// Could not be spawned or waited on
    Faulted,

    /// Dry run: would have been executed
    Planned,
}

/// One executed (or skipped) step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub working_dir: PathBuf,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
}

/// Metrics for one pipeline run.
#[derive(Debug)]
pub struct Metrics {
    /// Steps that ran to completion with exit code 0
    pub steps_succeeded: AtomicU64,

    /// Steps skipped thanks to an existing success marker
    pub steps_skipped: AtomicU64,

    /// Steps that failed or could not be run
    pub steps_failed: AtomicU64,

    /// Steps a dry run would have executed
    pub steps_planned: AtomicU64,

    start_time: Option<Instant>,
    records: Mutex<Vec<StepRecord>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            steps_succeeded: AtomicU64::new(0),
            steps_skipped: AtomicU64::new(0),
            steps_failed: AtomicU64::new(0),
            steps_planned: AtomicU64::new(0),
            start_time: None,
            records: Mutex::new(Vec::new()),
        }
    }
}

impl Metrics {
    /// Create new metrics, starting the run clock.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    /// Record the outcome of one step.
    pub fn record_step(
        &self,
        step: &str,
        working_dir: &Path,
        outcome: StepOutcome,
        duration: Duration,
    ) {
        let counter = match outcome {
            StepOutcome::Succeeded => &self.steps_succeeded,
            StepOutcome::Planned => &self.steps_planned,
            StepOutcome::Skipped => &self.steps_skipped,
            StepOutcome::Failed { .. } | StepOutcome::Faulted => &self.steps_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let record = StepRecord {
            step: step.to_string(),
            working_dir: working_dir.to_path_buf(),
            outcome,
            duration,
        };
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let steps = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        MetricsSnapshot {
            steps_succeeded: self.steps_succeeded.load(Ordering::Relaxed),
            steps_skipped: self.steps_skipped.load(Ordering::Relaxed),
            steps_failed: self.steps_failed.load(Ordering::Relaxed),
            steps_planned: self.steps_planned.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            steps,
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub steps_succeeded: u64,
    pub steps_skipped: u64,
    pub steps_failed: u64,
    pub steps_planned: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    /// Steps in execution order
    pub steps: Vec<StepRecord>,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path.display());
        Ok(())
    }

    /// Steps whose processes actually did work (excludes skips).
    pub fn busy_time(&self) -> Duration {
        self.steps
            .iter()
            .filter(|r| r.outcome != StepOutcome::Skipped)
            .map(|r| r.duration)
            .sum()
    }

    /// Print a final summary to stderr; stdout carries tool output.
    pub fn print_summary(&self) {
        eprintln!("\n=== Pipeline Summary ===");
        eprintln!("Total time: {:.1}s", self.elapsed.as_secs_f64());
        eprintln!("Steps succeeded: {}", self.steps_succeeded);
        eprintln!("Steps skipped: {}", self.steps_skipped);
        eprintln!("Steps failed: {}", self.steps_failed);
        if self.steps_planned > 0 {
            eprintln!("Steps planned: {}", self.steps_planned);
        }

        if !self.steps.is_empty() {
            eprintln!("\n--- Steps ---");
            for record in &self.steps {
                let status = match record.outcome {
                    StepOutcome::Succeeded => "ok".to_string(),
                    StepOutcome::Skipped => "skipped".to_string(),
                    StepOutcome::Failed { exit_code } => format!("failed ({})", exit_code),
                    StepOutcome::Faulted => "fault".to_string(),
                    StepOutcome::Planned => "planned".to_string(),
                };
                eprintln!(
                    "{:<48} {:>12} {:>9.1}s",
                    record.step,
                    status,
                    record.duration.as_secs_f64()
                );
            }
        }
        eprintln!("========================\n");
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Steps: {} succeeded, {} skipped, {} failed, {} planned | Busy: {:.1}s | Elapsed: {:.1}s",
            self.steps_succeeded,
            self.steps_skipped,
            self.steps_failed,
            self.steps_planned,
            self.busy_time().as_secs_f64(),
            self.elapsed.as_secs_f64(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_steps() {
        let metrics = Metrics::new();
        let dir = Path::new("/work/fit-dtm");

        metrics.record_step("generate-dsm", dir, StepOutcome::Skipped, Duration::ZERO);
        metrics.record_step("fit-dtm", dir, StepOutcome::Succeeded, Duration::from_secs(2));
        metrics.record_step(
            "compute-ndvi",
            dir,
            StepOutcome::Failed { exit_code: 3 },
            Duration::from_secs(1),
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.steps_succeeded, 1);
        assert_eq!(snapshot.steps_skipped, 1);
        assert_eq!(snapshot.steps_failed, 1);

        let names: Vec<&str> = snapshot.steps.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(names, vec!["generate-dsm", "fit-dtm", "compute-ndvi"]);
        assert_eq!(snapshot.busy_time(), Duration::from_secs(3));
    }

    #[test]
    fn test_planned_steps_not_counted_as_succeeded() {
        let metrics = Metrics::new();
        let dir = Path::new("/work/fit-dtm");
        metrics.record_step("generate-dsm", dir, StepOutcome::Planned, Duration::ZERO);
        metrics.record_step("fit-dtm", dir, StepOutcome::Planned, Duration::ZERO);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.steps_planned, 2);
        assert_eq!(snapshot.steps_succeeded, 0);
        assert!(format!("{}", snapshot).contains("0 succeeded"));
        assert!(format!("{}", snapshot).contains("2 planned"));
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = MetricsSnapshot {
            steps_succeeded: 12,
            steps_skipped: 3,
            steps_failed: 0,
            steps_planned: 0,
            elapsed: Duration::from_secs(10),
            steps: vec![],
        };

        let display = format!("{}", snapshot);
        assert!(display.contains("12 succeeded"));
        assert!(display.contains("3 skipped"));
        assert!(display.contains("Elapsed: 10.0s"));
    }

    #[test]
    fn test_save_to_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pipeline-summary.json");

        let metrics = Metrics::new();
        metrics.record_step(
            "segment-by-height",
            Path::new("/w/segment-by-height"),
            StepOutcome::Failed { exit_code: -9 },
            Duration::from_millis(1500),
        );
        metrics.snapshot().save_to_file(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["steps_failed"], 1);
        let step = &json["steps"][0];
        assert_eq!(step["step"], "segment-by-height");
        assert_eq!(step["status"], "failed");
        assert_eq!(step["exit_code"], -9);
        assert_eq!(step["duration"], 1.5);
    }

    #[test]
    fn test_zero_elapsed_without_clock() {
        let metrics = Metrics::default();
        assert_eq!(metrics.elapsed(), Duration::ZERO);
    }
}
