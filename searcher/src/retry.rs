//! Retry orchestrator: bounded cycles of main call plus one correction.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::backoff::backoff_delay;
use crate::core::model::detect_model;
use crate::core::payload::{AgentPayload, parse_payload};
use crate::correction::Corrector;
use crate::error::{CorrectionError, CycleError, RetryError};
use crate::io::agent::{Agent, AgentRequest};
use crate::io::config::{AgentConfig, RetryConfig};
use crate::io::prompt::PromptBuilder;

/// How many cycles to run and how long to wait between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            backoff: cfg.backoff_schedule(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Models for the main and correction calls. `None` means agent default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSelection {
    pub main: Option<String>,
    pub correction: Option<String>,
}

impl ModelSelection {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self {
            main: cfg.model.clone(),
            correction: cfg.correction_model().map(str::to_string),
        }
    }

    /// Label reported in metadata: configured, else detected, else `auto`.
    pub fn label(&self, detected: Option<&str>) -> String {
        self.main
            .as_deref()
            .or(detected)
            .unwrap_or("auto")
            .to_string()
    }
}

/// A validated payload and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    pub payload: AgentPayload,
    /// Model named in the agent output when none was configured.
    pub detected_model: Option<String>,
    /// Cycles run, including the successful one.
    pub attempts: u32,
    /// Whether the payload came from the correction call.
    pub corrected: bool,
}

/// Runs one prompt to a validated payload or gives up.
pub struct RetryOrchestrator<'a, A: Agent> {
    pub agent: &'a A,
    pub prompts: &'a PromptBuilder,
    pub policy: &'a RetryPolicy,
    pub models: &'a ModelSelection,
    /// Directory for correction artifacts.
    pub artifact_dir: &'a Path,
}

impl<A: Agent> RetryOrchestrator<'_, A> {
    /// Run `prompt` until a cycle yields a valid payload.
    ///
    /// Every cycle sends the same prompt. A missing agent binary or a shutdown
    /// ends the loop at once; every other failure is retried after backoff.
    #[instrument(skip_all, fields(max_attempts = self.policy.max_attempts))]
    pub async fn execute_with_retry(
        &self,
        prompt: &str,
        schema_example: &str,
    ) -> Result<RetryOutcome, RetryError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut detected_model = None;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(attempt, "starting cycle");
            match self.run_cycle(prompt, schema_example, &mut detected_model).await {
                Ok((payload, corrected)) => {
                    info!(attempt, corrected, "cycle produced a valid payload");
                    return Ok(RetryOutcome {
                        payload,
                        detected_model,
                        attempts: attempt,
                        corrected,
                    });
                }
                Err(CycleError::Process(err)) if !err.is_retryable() => {
                    warn!(attempt, err = %err, "agent unavailable, not retrying");
                    return Err(RetryError::AgentUnavailable(err));
                }
                Err(err) => {
                    if attempt >= max_attempts {
                        warn!(attempt, err = %err, "all cycles failed");
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    let delay = backoff_delay(&self.policy.backoff, attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        err = %err,
                        "cycle failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn run_cycle(
        &self,
        prompt: &str,
        schema_example: &str,
        detected_model: &mut Option<String>,
    ) -> Result<(AgentPayload, bool), CycleError> {
        let request = AgentRequest::new(prompt, self.models.main.as_deref());
        let raw = self.agent.run(&request).await?;

        if self.models.main.is_none() {
            if let Some(model) = detect_model(&raw) {
                debug!(model = %model, "detected agent model");
                *detected_model = Some(model);
            }
        }

        let defect = match parse_payload(&raw) {
            Ok(payload) => return Ok((payload, false)),
            Err(defect) => defect,
        };
        info!(defect = %defect, raw_len = raw.len(), "agent output unusable, attempting correction");

        let corrector = Corrector {
            agent: self.agent,
            prompts: self.prompts,
            artifact_dir: self.artifact_dir,
            model: self.models.correction.as_deref(),
        };
        match corrector.correct(&raw, schema_example).await {
            Ok(payload) => Ok((payload, true)),
            Err(CorrectionError::Process(err)) if !err.is_retryable() => {
                Err(CycleError::Process(err))
            }
            Err(correction) => Err(CycleError::Uncorrected { defect, correction }),
        }
    }
}
