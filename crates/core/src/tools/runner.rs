//! Subprocess runner with cancellation, output capture, and failure
//! logs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::{wait_cancelled, CancelSignal};

// Compatibility shim: newer torch builds refuse to load the
// transcription models without this.
const TORCH_ENV: &str = "TORCH_FORCE_NO_WEIGHTS_ONLY_LOAD";

/// Errors from tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The binary could not be launched (missing on PATH, bad
    /// permissions).
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit. The captured stderr is in the log file.
    #[error("{tool} failed, log at {log_path}")]
    Failed { tool: String, log_path: PathBuf },

    /// The caller's cancellation signal fired.
    #[error("{tool} cancelled")]
    Cancelled { tool: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One tool invocation.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments in order.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub envs: HashMap<String, String>,
    /// Working directory, when it matters.
    pub cwd: Option<PathBuf>,
}

impl ToolSpec {
    /// Build a spec from a program and its arguments.
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            envs: HashMap::new(),
            cwd: None,
        }
    }

    /// Build a spec from owned arguments.
    pub fn with_args(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: HashMap::new(),
            cwd: None,
        }
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    /// Short tool name for logs (program without its path).
    pub fn tool_name(&self) -> String {
        Path::new(&self.program)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.clone())
    }

    /// The command line as a displayable string.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Captured result of a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Standard output. Drivers that only care about side-effect files
    /// ignore this; the prober parses it.
    pub stdout: String,
    /// Standard error, also written to the failure log on error exits.
    pub stderr: String,
}

/// Seam for subprocess execution.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the tool to completion, honoring cancellation.
    async fn run(&self, spec: &ToolSpec, cancel: &CancelSignal) -> Result<ToolOutput, ToolError>;
}

/// Production runner backed by `tokio::process`.
pub struct SystemRunner {
    log_dir: PathBuf,
}

impl SystemRunner {
    /// Create a runner writing failure logs under `log_dir`.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    async fn write_failure_log(&self, spec: &ToolSpec, stderr: &str) -> PathBuf {
        let name = format!(
            "{}-{}.log",
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            spec.tool_name()
        );
        let path = self.log_dir.join(name);
        let body = format!("command: {}\n\n{}", spec.command_line(), stderr);
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            warn!(dir = %self.log_dir.display(), error = %e, "Could not create tool log directory");
        }
        if let Err(e) = tokio::fs::write(&path, body).await {
            warn!(path = %path.display(), error = %e, "Could not write tool failure log");
        }
        path
    }
}

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run(&self, spec: &ToolSpec, cancel: &CancelSignal) -> Result<ToolOutput, ToolError> {
        let tool = spec.tool_name();
        debug!(tool = %tool, command = %spec.command_line(), "Running external tool");

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &spec.envs {
            cmd.env(k, v);
        }
        if !spec.envs.contains_key(TORCH_ENV) && std::env::var_os(TORCH_ENV).is_none() {
            cmd.env(TORCH_ENV, "1");
        }

        let child = cmd.spawn().map_err(|source| ToolError::Launch {
            tool: tool.clone(),
            source,
        })?;

        let output = tokio::select! {
            out = child.wait_with_output() => out?,
            _ = wait_cancelled(cancel) => {
                return Err(ToolError::Cancelled { tool });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let log_path = self.write_failure_log(spec, &stderr).await;
            warn!(tool = %tool, log = %log_path.display(), "External tool failed");
            return Err(ToolError::Failed { tool, log_path });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}
