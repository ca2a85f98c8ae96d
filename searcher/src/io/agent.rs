//! Agent abstraction for prompt-in, text-out invocations.
//!
//! The [`Agent`] trait decouples the retry and deep-search orchestration from
//! the actual backend (an external CLI such as `claude`). Tests use scripted
//! agents that return predetermined outputs without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::ProcessError;
use crate::io::config::AgentConfig;
use crate::io::process::{RunLimits, run_command_with_deadline};

/// One agent invocation: opaque prompt text plus an optional model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub prompt: String,
    /// `None` lets the agent choose its default model.
    pub model: Option<String>,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>, model: Option<&str>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.map(str::to_string),
        }
    }
}

/// Abstraction over agent backends.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run the agent to completion and return its raw stdout.
    async fn run(&self, request: &AgentRequest) -> Result<String, ProcessError>;
}

/// Agent that spawns an external CLI and pipes the prompt to its stdin.
#[derive(Debug, Clone)]
pub struct CliAgent {
    config: AgentConfig,
    work_dir: PathBuf,
    shutdown: CancellationToken,
}

impl CliAgent {
    pub fn new(config: AgentConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that, once cancelled, terminates any in-flight agent process.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Command-line arguments for one call. The prompt is never among them.
    pub fn build_args(&self, model: Option<&str>) -> Vec<String> {
        let mut args = self.config.args.clone();
        if let Some(model) = model {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        let tools = self.config.allowed_tools.as_deref().map(str::trim);
        if let Some(tools) = tools.filter(|tools| !tools.is_empty()) {
            args.push("--allowedTools".to_string());
            args.push(tools.to_string());
        }
        args
    }

    fn limits(&self) -> RunLimits {
        RunLimits {
            timeout: self.config.timeout(),
            grace: self.config.grace(),
            output_limit_bytes: self.config.output_limit_bytes,
            progress_interval: self.config.progress_interval(),
            log_stderr: self.config.verbose,
        }
    }
}

#[async_trait]
impl Agent for CliAgent {
    #[instrument(skip_all, fields(command = %self.config.command, model = request.model.as_deref().unwrap_or("auto")))]
    async fn run(&self, request: &AgentRequest) -> Result<String, ProcessError> {
        fs::create_dir_all(&self.work_dir).map_err(|err| ProcessError::SpawnFailure {
            reason: format!("create work dir {}: {err}", self.work_dir.display()),
        })?;

        let mut cmd = Command::new(&self.config.command);
        cmd.args(self.build_args(request.model.as_deref()))
            .current_dir(&self.work_dir);

        info!(prompt_len = request.prompt.len(), "starting agent");
        let output = run_command_with_deadline(
            cmd,
            request.prompt.as_bytes(),
            &self.limits(),
            &self.shutdown,
        )
        .await?;

        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(ProcessError::NonZeroExit {
                code: output.status.code(),
                stderr: output.stderr_text(),
            });
        }
        if output.stdout_truncated > 0 {
            warn!(
                stdout_truncated = output.stdout_truncated,
                "agent stdout exceeded output limit"
            );
        }

        debug!(stdout_len = output.stdout.len(), "agent completed successfully");
        Ok(output.stdout_text())
    }
}
