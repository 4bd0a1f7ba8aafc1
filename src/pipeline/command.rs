//! Rendered process invocations and tool resolution.

use crate::config::ToolsConfig;
use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// A fully rendered process invocation: program plus argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl StepCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Arguments as lossy strings, for assertions and logging.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    pub fn to_tokio(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for StepCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Resolves tool names to interpreter-prefixed invocations.
#[derive(Debug, Clone)]
pub struct ToolSet {
    tools_dir: PathBuf,
    python: Vec<String>,
    vissat_python: Vec<String>,
    vissat_script: PathBuf,
    ply2txt_script: PathBuf,
    txt2las: PathBuf,
}

impl ToolSet {
    /// Build from configuration. Without an explicit tools directory the
    /// directory of the running executable is used.
    pub fn from_config(config: &ToolsConfig) -> Result<Self> {
        let tools_dir = match &config.tools_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_exe()
                .context("Failed to locate the running executable")?
                .parent()
                .map(Path::to_path_buf)
                .context("Executable has no parent directory")?,
        };

        Ok(Self {
            tools_dir,
            python: config.python.clone(),
            vissat_python: config.vissat_python.clone(),
            vissat_script: config.vissat_script.clone(),
            ply2txt_script: config.ply2txt_script.clone(),
            txt2las: config.txt2las.clone(),
        })
    }

    pub fn tools_dir(&self) -> &Path {
        &self.tools_dir
    }

    fn interpreted(interpreter: &[String], script: &Path) -> StepCommand {
        // Config validation guarantees a non-empty interpreter
        let command = match interpreter.split_first() {
            Some((program, prefix)) => StepCommand::new(program).args(prefix),
            None => StepCommand::new("python"),
        };
        command.arg(script)
    }

    /// `<python> <tools_dir>/<script>`
    pub fn pipeline_script(&self, script: &str) -> StepCommand {
        Self::interpreted(&self.python, &self.tools_dir.join(script))
    }

    pub fn vissat(&self) -> StepCommand {
        Self::interpreted(&self.vissat_python, &self.vissat_script)
    }

    pub fn ply2txt(&self) -> StepCommand {
        Self::interpreted(&self.vissat_python, &self.ply2txt_script)
    }

    pub fn txt2las(&self) -> StepCommand {
        StepCommand::new(&self.txt2las)
    }
}
