//! Single-round `search` entry point and the [`Searcher`] facade.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::core::payload::{AgentPayload, PayloadFields};
use crate::error::{ToolFailure, codes, error_chain};
use crate::io::agent::Agent;
use crate::io::config::SearcherConfig;
use crate::io::prompt::{PromptBuilder, SEARCH_SCHEMA_EXAMPLE};
use crate::retry::{ModelSelection, RetryOrchestrator, RetryPolicy};

/// Result of a successful `search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub report: String,
    pub metadata: SearchMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMetadata {
    /// Configured model, else the one detected in agent output, else `auto`.
    pub model: String,
    pub attempts: u32,
    pub corrected: bool,
    pub sources: Vec<String>,
    pub queries: Vec<String>,
    /// Any other fields the agent included in its payload.
    #[serde(skip_serializing_if = "PayloadFields::is_empty")]
    pub extra: PayloadFields,
}

/// Entry points bound to one agent and one configuration.
pub struct Searcher<A: Agent> {
    agent: A,
    prompts: PromptBuilder,
    policy: RetryPolicy,
    models: ModelSelection,
    work_dir: PathBuf,
    default_max_rounds: u32,
}

impl<A: Agent> Searcher<A> {
    pub fn new(agent: A, config: &SearcherConfig) -> Self {
        Self {
            agent,
            prompts: PromptBuilder::new(),
            policy: RetryPolicy::from_config(&config.retry),
            models: ModelSelection::from_config(&config.agent),
            work_dir: config.work_dir.clone(),
            default_max_rounds: config.deep_search.default_max_rounds,
        }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub(crate) fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub(crate) fn models(&self) -> &ModelSelection {
        &self.models
    }

    pub(crate) fn default_max_rounds(&self) -> u32 {
        self.default_max_rounds
    }

    pub(crate) fn orchestrator(&self) -> RetryOrchestrator<'_, A> {
        RetryOrchestrator {
            agent: &self.agent,
            prompts: &self.prompts,
            policy: &self.policy,
            models: &self.models,
            artifact_dir: &self.work_dir,
        }
    }

    /// Research `query` in a single round.
    #[instrument(skip_all, fields(query_len = query.len()))]
    pub async fn search(&self, query: &str) -> Result<SearchReport, ToolFailure> {
        if query.trim().is_empty() {
            return Err(ToolFailure::new(
                codes::INVALID_REQUEST,
                "query must not be empty",
            ));
        }
        let prompt = self.prompts.search(query).map_err(prompt_failure)?;
        let outcome = self
            .orchestrator()
            .execute_with_retry(&prompt, SEARCH_SCHEMA_EXAMPLE)
            .await
            .map_err(|err| ToolFailure::from_retry("search failed", &err))?;

        let model = self.models.label(outcome.detected_model.as_deref());
        let sources = outcome.payload.sources();
        let queries = outcome.payload.queries();
        match outcome.payload {
            AgentPayload::Success { report, mut fields } => {
                fields.remove("sources");
                fields.remove("queries");
                info!(
                    attempts = outcome.attempts,
                    corrected = outcome.corrected,
                    sources = sources.len(),
                    "search complete"
                );
                Ok(SearchReport {
                    report,
                    metadata: SearchMetadata {
                        model,
                        attempts: outcome.attempts,
                        corrected: outcome.corrected,
                        sources,
                        queries,
                        extra: fields,
                    },
                })
            }
            AgentPayload::Failure { error, .. } => Err(ToolFailure::new(
                codes::AGENT_REPORTED_FAILURE,
                error.unwrap_or_else(|| "agent reported failure without details".to_string()),
            )),
        }
    }
}

pub(crate) fn prompt_failure(err: minijinja::Error) -> ToolFailure {
    ToolFailure::new(codes::SEARCH_FAILED, "failed to render prompt").with_details(error_chain(&err))
}

/// Caller-facing JSON: the report fields plus `success`, or `success: false`
/// with the failure under `error`.
pub fn response_json<T: Serialize>(result: &Result<T, ToolFailure>) -> serde_json::Result<Value> {
    match result {
        Ok(report) => {
            let mut value = serde_json::to_value(report)?;
            if let Value::Object(map) = &mut value {
                map.insert("success".to_string(), Value::Bool(true));
            }
            Ok(value)
        }
        Err(failure) => Ok(json!({ "success": false, "error": failure })),
    }
}
