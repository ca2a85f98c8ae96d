//! Correction fallback: one repair call over invalid agent output.
//!
//! The invalid output is handed to the repair call through a temp file rather
//! than inline in the prompt, so arbitrarily large or oddly-quoted output
//! cannot break the prompt. The file is removed before [`Corrector::correct`]
//! returns, whatever the outcome.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::core::payload::{AgentPayload, parse_payload};
use crate::error::CorrectionError;
use crate::io::agent::{Agent, AgentRequest};
use crate::io::artifact::CorrectionArtifact;
use crate::io::prompt::PromptBuilder;

/// Runs the repair call for one retry cycle.
pub struct Corrector<'a, A: Agent> {
    pub agent: &'a A,
    pub prompts: &'a PromptBuilder,
    /// Directory that holds correction artifacts.
    pub artifact_dir: &'a Path,
    /// Model for the repair call; `None` lets the agent choose.
    pub model: Option<&'a str>,
}

impl<A: Agent> Corrector<'_, A> {
    /// Ask the agent to turn `invalid_raw` into a payload shaped like `schema_example`.
    #[instrument(skip_all, fields(invalid_len = invalid_raw.len()))]
    pub async fn correct(
        &self,
        invalid_raw: &str,
        schema_example: &str,
    ) -> Result<AgentPayload, CorrectionError> {
        let artifact = CorrectionArtifact::create(self.artifact_dir, invalid_raw)
            .map_err(CorrectionError::Artifact)?;
        let prompt = self.prompts.correction(schema_example, artifact.path())?;
        let request = AgentRequest::new(prompt, self.model);

        info!(path = %artifact.path().display(), "running correction call");
        let outcome = self.agent.run(&request).await;
        drop(artifact);

        let raw = outcome.inspect_err(|err| warn!(err = %err, "correction call failed"))?;
        let payload = parse_payload(&raw).map_err(CorrectionError::Defect)?;
        debug!(success = payload.is_success(), "correction produced a valid payload");
        Ok(payload)
    }
}
