//! Error taxonomy for agent invocations, recovery, and the caller boundary.
//!
//! Internal failures are typed so the orchestrators can decide between
//! "retry", "correct", and "give up". Everything that crosses the public
//! entry points is flattened into a [`ToolFailure`] with a stable code.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure of a single agent subprocess invocation.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(
        "agent binary `{program}` was not found; install it or point `agent.command` at it in the config"
    )]
    NotFound { program: String },

    #[error("agent exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("agent timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("failed to run agent: {reason}")]
    SpawnFailure { reason: String },

    #[error("agent was interrupted by shutdown")]
    Interrupted,
}

/// Discriminant of [`ProcessError`], convenient for matching in tests and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessErrorKind {
    NotFound,
    NonZeroExit,
    Timeout,
    SpawnFailure,
    Interrupted,
}

impl ProcessError {
    pub fn kind(&self) -> ProcessErrorKind {
        match self {
            Self::NotFound { .. } => ProcessErrorKind::NotFound,
            Self::NonZeroExit { .. } => ProcessErrorKind::NonZeroExit,
            Self::Timeout { .. } => ProcessErrorKind::Timeout,
            Self::SpawnFailure { .. } => ProcessErrorKind::SpawnFailure,
            Self::Interrupted => ProcessErrorKind::Interrupted,
        }
    }

    /// Whether another cycle could plausibly succeed.
    ///
    /// A missing binary or a shutdown will not fix itself between cycles.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound { .. } | Self::Interrupted)
    }
}

/// Why raw agent output could not be turned into a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OutputDefect {
    #[error("no JSON payload found in agent output")]
    ExtractionFailure,
    #[error("agent payload is missing `success` or a `report` for a successful result")]
    ValidationFailure,
}

/// Failure of the correction fallback. Soft: the outer cycle continues.
#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("write correction artifact: {0}")]
    Artifact(#[source] std::io::Error),

    #[error("render correction prompt: {0}")]
    Prompt(#[from] minijinja::Error),

    #[error("correction call failed: {0}")]
    Process(#[from] ProcessError),

    #[error("correction output unusable: {0}")]
    Defect(OutputDefect),
}

/// Failure of one retry cycle (main call plus at most one correction).
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{defect}; {correction}")]
    Uncorrected {
        defect: OutputDefect,
        #[source]
        correction: CorrectionError,
    },
}

/// Terminal failure of the retry orchestrator.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("{0}")]
    AgentUnavailable(ProcessError),

    #[error("all {attempts} attempts failed; last error: {last}")]
    Exhausted { attempts: u32, last: CycleError },
}

/// Stable failure codes surfaced to callers.
pub mod codes {
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const AGENT_NOT_FOUND: &str = "AGENT_NOT_FOUND";
    pub const INTERRUPTED: &str = "INTERRUPTED";
    pub const RETRIES_EXHAUSTED: &str = "RETRIES_EXHAUSTED";
    pub const SEARCH_FAILED: &str = "SEARCH_FAILED";
    pub const AGENT_REPORTED_FAILURE: &str = "AGENT_REPORTED_FAILURE";
}

/// Caller-visible failure: a stable code, a human message, optional details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolFailure {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ToolFailure {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Map a terminal retry failure, prefixing the message with `context`.
    pub fn from_retry(context: &str, err: &RetryError) -> Self {
        match err {
            RetryError::AgentUnavailable(inner) => {
                let code = match inner.kind() {
                    ProcessErrorKind::Interrupted => codes::INTERRUPTED,
                    _ => codes::AGENT_NOT_FOUND,
                };
                Self::new(code, format!("{context}: {inner}"))
            }
            RetryError::Exhausted { attempts, last } => Self::new(
                codes::RETRIES_EXHAUSTED,
                format!("{context}: no valid result after {attempts} attempts"),
            )
            .with_details(error_chain(last)),
        }
    }
}

/// Render an error and its sources as `outer: inner: innermost`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_binary_and_shutdown_are_terminal() {
        assert!(
            !ProcessError::NotFound {
                program: "claude".to_string()
            }
            .is_retryable()
        );
        assert!(!ProcessError::Interrupted.is_retryable());
        assert!(
            ProcessError::Timeout {
                after: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(
            ProcessError::NonZeroExit {
                code: Some(2),
                stderr: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn exhausted_failure_carries_last_cause_in_details() {
        let err = RetryError::Exhausted {
            attempts: 3,
            last: CycleError::Uncorrected {
                defect: OutputDefect::ExtractionFailure,
                correction: CorrectionError::Defect(OutputDefect::ValidationFailure),
            },
        };

        let failure = ToolFailure::from_retry("search failed", &err);
        assert_eq!(failure.code, codes::RETRIES_EXHAUSTED);
        assert!(failure.message.contains("3 attempts"));
        let details = failure.details.expect("details");
        assert!(details.contains("no JSON payload"));
        assert!(details.contains("correction output unusable"));
    }

    #[test]
    fn missing_binary_maps_to_not_found_code() {
        let err = RetryError::AgentUnavailable(ProcessError::NotFound {
            program: "claude".to_string(),
        });
        let failure = ToolFailure::from_retry("search failed", &err);
        assert_eq!(failure.code, codes::AGENT_NOT_FOUND);
        assert!(failure.message.contains("agent.command"));
    }
}
