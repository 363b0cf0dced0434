//! External tool invocation behind a swappable capability.
//!
//! Both external programs (the Fiji stitcher and ImageMagick) are reached
//! through [`ExternalToolRunner`]: one operation taking a program, its
//! arguments and a timeout, returning exit code and captured output. The
//! pipeline never spawns processes directly, so tests substitute a fake
//! runner and assert on the generated macro and argument lists without
//! either program installed.
//!
//! [`ProcessRunner`] is the production implementation. Children are spawned
//! with `kill_on_drop`, so when the timeout future wins the race the child
//! is dropped and killed rather than left running in the background.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// One external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Shell-like rendering for logs and error messages.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!("{arg:?}"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Exit status and captured output of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Human-readable exit status, e.g. `exit code 3` or `killed by signal`.
    pub fn status_text(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "killed by signal".to_string(),
        }
    }
}

/// Why a tool could not be run to completion.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started (not installed, not executable).
    #[error("could not launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran longer than its timeout and was killed.
    #[error("'{program}' timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Capability to run an external program and wait for it.
///
/// Implementations must be `Send + Sync`: one runner is shared by every
/// document of a batch and called concurrently.
#[async_trait]
pub trait ExternalToolRunner: Send + Sync {
    /// Run `invocation` to completion.
    ///
    /// A non-zero exit is **not** an error at this level; it is reported in
    /// [`ToolOutput::exit_code`] so the caller can attach its own context.
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError>;
}

/// Runs tools as real child processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ExternalToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let program = invocation.program.display().to_string();
        debug!("Launching: {}", invocation.command_line());

        let child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Launch {
                program: program.clone(),
                source,
            })?;

        let start = Instant::now();
        let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(|source| ToolError::Launch {
                program: program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    program,
                    timeout: invocation.timeout,
                })
            }
        };

        let result = ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            "{} finished: {} in {}ms",
            program,
            result.status_text(),
            start.elapsed().as_millis()
        );
        if !result.stdout.trim().is_empty() {
            debug!("{} stdout:\n{}", program, result.stdout.trim_end());
        }
        if !result.stderr.trim().is_empty() {
            debug!("{} stderr:\n{}", program, result.stderr.trim_end());
        }
        Ok(result)
    }
}

/// Last `max_lines` lines of a tool's output, for compact error summaries.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
