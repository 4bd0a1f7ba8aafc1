//! Checkpointed execution of one external step.
//!
//! A step is skipped when its success marker exists. Otherwise its stale
//! markers and log are cleared and the command is spawned with stdout and
//! stderr both attached to one pipe, so the merged stream keeps the order
//! the child wrote it in. Every line is echoed to our stdout and appended to
//! `<step>.log`. The exit code is then persisted as a marker.

use super::checkpoint::Checkpoint;
use super::command::StepCommand;
use super::metrics::{Metrics, StepOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::io::{BufRead, BufReader};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Output lines buffered between the pipe reader and the writers.
const OUTPUT_BUFFER: usize = 256;

/// Fatal step failures.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Step '{step}' failed with exit code {code}")]
    Failed { step: String, code: i32 },

    #[error("Failed to spawn step '{step}'")]
    Spawn {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Step '{step}' did not exit within {timeout:?} after closing its output")]
    ExitWait { step: String, timeout: Duration },
}

/// Executes pipeline steps.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run `command` as `step_name` in `working_dir`, returning its exit code.
    ///
    /// With `abort_on_error` a non-zero exit is returned as
    /// [`StepError::Failed`] instead of `Ok(code)`.
    async fn run_step(
        &self,
        working_dir: &Path,
        step_name: &str,
        command: &StepCommand,
        abort_on_error: bool,
    ) -> Result<i32>;
}

/// Spawns real processes.
pub struct StepRunner {
    metrics: Arc<Metrics>,
    exit_wait: Option<Duration>,
}

impl StepRunner {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            exit_wait: None,
        }
    }

    /// Bound the wait for process exit once its output streams have closed.
    pub fn with_exit_wait(mut self, exit_wait: Option<Duration>) -> Self {
        self.exit_wait = exit_wait;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Spawn, stream and wait. Returns the exit code.
    async fn execute(&self, checkpoint: &Checkpoint, command: &StepCommand) -> Result<i32> {
        let step = checkpoint.step_name();
        let log_path = checkpoint.log_path();
        let mut log = tokio::fs::File::create(&log_path)
            .await
            .with_context(|| format!("Failed to create step log: {}", log_path.display()))?;

        // stdout and stderr share one pipe so the child's write order is kept
        let (reader, writer) = os_pipe::pipe().context("Failed to create output pipe")?;
        let writer_err = writer
            .try_clone()
            .context("Failed to duplicate output pipe")?;

        let mut process = command.to_tokio();
        process.stdout(writer).stderr(writer_err);
        let spawned = process.spawn();
        // The command holds our copies of the write end; the reader only
        // sees EOF once they are closed
        drop(process);
        let mut child = spawned.map_err(|source| StepError::Spawn {
            step: step.to_string(),
            source,
        })?;

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(OUTPUT_BUFFER);
        let forwarder = forward_lines(reader, tx);

        let drained = drain_output(&mut rx, Some(tokio::io::stdout()), &mut log).await;
        drop(rx);
        if let Err(e) = forwarder.await.context("Output reader task panicked")? {
            tracing::warn!("Error reading output of step {}: {}", step, e);
        }

        let status = match self.exit_wait {
            Some(timeout) => tokio::time::timeout(timeout, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };
        let Some(status) = status else {
            let _ = child.start_kill();
            return Err(StepError::ExitWait {
                step: step.to_string(),
                timeout: self.exit_wait.unwrap_or_default(),
            }
            .into());
        };
        let status = status.with_context(|| format!("Failed to wait for step {}", step))?;
        drained.with_context(|| format!("Failed to write step log: {}", log_path.display()))?;

        Ok(exit_code(status))
    }
}

#[async_trait]
impl StepExecutor for StepRunner {
    async fn run_step(
        &self,
        working_dir: &Path,
        step_name: &str,
        command: &StepCommand,
        abort_on_error: bool,
    ) -> Result<i32> {
        let checkpoint = Checkpoint::new(working_dir, step_name);
        if checkpoint.has_succeeded() {
            tracing::info!("---- Skipping step: {} (already completed) ----", step_name);
            self.metrics
                .record_step(step_name, working_dir, StepOutcome::Skipped, Duration::ZERO);
            return Ok(0);
        }

        if let Some(code) = checkpoint.recorded_exit_code()? {
            tracing::info!("Previous attempt of {} exited with code {}, retrying", step_name, code);
        }
        checkpoint.clear_prior()?;
        std::fs::create_dir_all(working_dir).with_context(|| {
            format!("Failed to create working directory: {}", working_dir.display())
        })?;

        tracing::info!("---- Running step: {} ----", step_name);
        tracing::debug!("{}", command);

        let start = Instant::now();
        let code = match self.execute(&checkpoint, command).await {
            Ok(code) => code,
            Err(e) => {
                self.metrics
                    .record_step(step_name, working_dir, StepOutcome::Faulted, start.elapsed());
                return Err(e);
            }
        };
        checkpoint.record_result(code)?;

        if code == 0 {
            self.metrics
                .record_step(step_name, working_dir, StepOutcome::Succeeded, start.elapsed());
            return Ok(0);
        }

        self.metrics.record_step(
            step_name,
            working_dir,
            StepOutcome::Failed { exit_code: code },
            start.elapsed(),
        );

        if abort_on_error {
            tracing::error!("---- Error on step: {}.  Aborting! ----", step_name);
            return Err(StepError::Failed {
                step: step_name.to_string(),
                code,
            }
            .into());
        }

        tracing::warn!("---- Step {} exited with code {} ----", step_name, code);
        Ok(code)
    }
}

/// Logs what would happen without spawning anything or touching markers.
pub struct DryRunExecutor {
    metrics: Arc<Metrics>,
}

impl DryRunExecutor {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl StepExecutor for DryRunExecutor {
    async fn run_step(
        &self,
        working_dir: &Path,
        step_name: &str,
        command: &StepCommand,
        _abort_on_error: bool,
    ) -> Result<i32> {
        let checkpoint = Checkpoint::new(working_dir, step_name);
        let outcome = if checkpoint.has_succeeded() {
            tracing::info!("[dry-run] {}: already completed, would skip", step_name);
            StepOutcome::Skipped
        } else if let Some(code) = checkpoint.recorded_exit_code()? {
            tracing::info!("[dry-run] {}: last attempt exited with code {}, would rerun", step_name, code);
            StepOutcome::Planned
        } else {
            tracing::info!("[dry-run] {}: would run in {}", step_name, working_dir.display());
            StepOutcome::Planned
        };
        tracing::info!("[dry-run]   {}", command);

        self.metrics
            .record_step(step_name, working_dir, outcome, Duration::ZERO);
        Ok(0)
    }
}

/// Forward raw lines from the merged output pipe into the channel.
fn forward_lines(
    reader: os_pipe::PipeReader,
    tx: mpsc::Sender<Vec<u8>>,
) -> JoinHandle<std::io::Result<()>> {
    tokio::task::spawn_blocking(move || {
        let mut reader = BufReader::new(reader);
        loop {
            let mut line = Vec::new();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Ok(());
            }
            if tx.blocking_send(line).is_err() {
                return Ok(());
            }
        }
    })
}

/// Write every received chunk to the log, echoing it while `echo` accepts
/// writes. A failing echo is dropped; the log keeps receiving output.
async fn drain_output<E, L>(
    rx: &mut mpsc::Receiver<Vec<u8>>,
    mut echo: Option<E>,
    log: &mut L,
) -> std::io::Result<()>
where
    E: AsyncWrite + Unpin,
    L: AsyncWrite + Unpin,
{
    while let Some(chunk) = rx.recv().await {
        if let Some(out) = echo.as_mut() {
            if let Err(e) = out.write_all(&chunk).await {
                tracing::warn!("Stopped echoing step output: {}", e);
                echo = None;
            }
        }
        log.write_all(&chunk).await?;
    }

    if let Some(mut out) = echo {
        let _ = out.flush().await;
    }
    log.flush().await
}

/// Exit code of a finished process. Signal terminations map to the negated
/// signal number.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}
