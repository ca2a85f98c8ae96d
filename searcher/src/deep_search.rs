//! Multi-round deep search: an initial research round followed by
//! verification rounds until the agent declares the report verified or the
//! round budget runs out.
//!
//! Only the first round can fail the call. A later round that fails ends the
//! loop early and the last good report is returned unverified.

use serde::Serialize;
use tracing::{Span, info, instrument, warn};

use crate::core::payload::AgentPayload;
use crate::core::rounds::{RoundRecord, SourceSet, resolve_max_rounds};
use crate::error::{RetryError, ToolFailure, codes, error_chain};
use crate::io::agent::Agent;
use crate::io::prompt::DEEP_SEARCH_SCHEMA_EXAMPLE;
use crate::retry::RetryOutcome;
use crate::search::{Searcher, prompt_failure};

/// How the round loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A round returned `verified: true`.
    Verified,
    /// The round budget ran out before verification.
    Exhausted,
    /// A verification round failed; the previous report stands.
    RoundFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeepSearchReport {
    pub report: String,
    pub verified: bool,
    pub metadata: DeepSearchMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeepSearchMetadata {
    /// Rounds that completed successfully.
    pub total_iterations: u32,
    pub max_iterations: u32,
    pub termination: Termination,
    pub rounds: Vec<RoundRecord>,
    /// Sources across all rounds, deduplicated in first-seen order.
    pub all_sources: Vec<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundState {
    Initial,
    Verifying(u32),
    Done(Termination),
}

impl RoundState {
    fn after(round: u32, verified: bool, max_rounds: u32) -> Self {
        if verified {
            Self::Done(Termination::Verified)
        } else if round >= max_rounds {
            Self::Done(Termination::Exhausted)
        } else {
            Self::Verifying(round + 1)
        }
    }
}

/// Accumulated state across rounds.
#[derive(Debug, Default)]
struct RoundLog {
    report: String,
    verified: bool,
    rounds: Vec<RoundRecord>,
    sources: SourceSet,
    detected_model: Option<String>,
    note: Option<String>,
}

impl RoundLog {
    /// Fold a successful round into the log. Failure payloads are ignored.
    fn record(&mut self, round: u32, outcome: RetryOutcome) {
        let sources = outcome.payload.sources();
        let queries = outcome.payload.queries();
        let verified = outcome.payload.verified();
        let AgentPayload::Success { report, .. } = outcome.payload else {
            return;
        };

        info!(
            round,
            verified,
            sources = sources.len(),
            attempts = outcome.attempts,
            "deep search round complete"
        );
        self.report = report;
        self.verified = verified;
        self.sources.extend(sources.iter().cloned());
        self.rounds.push(RoundRecord {
            round,
            sources,
            queries,
            verified,
        });
        if outcome.detected_model.is_some() {
            self.detected_model = outcome.detected_model;
        }
    }

    fn stop_early(&mut self, round: u32, reason: String) -> RoundState {
        warn!(round, reason = %reason, "verification round failed, keeping previous report");
        self.verified = false;
        self.note = Some(format!(
            "verification did not complete: round {round} failed ({reason})"
        ));
        RoundState::Done(Termination::RoundFailed)
    }

    fn finish(self, termination: Termination, max_rounds: u32, model: String) -> DeepSearchReport {
        DeepSearchReport {
            report: self.report,
            verified: self.verified,
            metadata: DeepSearchMetadata {
                total_iterations: self.rounds.len() as u32,
                max_iterations: max_rounds,
                termination,
                rounds: self.rounds,
                all_sources: self.sources.into_vec(),
                model,
                note: self.note,
            },
        }
    }
}

impl<A: Agent> Searcher<A> {
    /// Research `topic` over up to `max_iterations` rounds.
    ///
    /// `None` uses the configured default. Any request is clamped to the
    /// supported range.
    #[instrument(skip_all, fields(topic_len = topic.len(), max_rounds = tracing::field::Empty))]
    pub async fn deep_search(
        &self,
        topic: &str,
        max_iterations: Option<u32>,
    ) -> Result<DeepSearchReport, ToolFailure> {
        if topic.trim().is_empty() {
            return Err(ToolFailure::new(
                codes::INVALID_REQUEST,
                "topic must not be empty",
            ));
        }
        let max_rounds = resolve_max_rounds(max_iterations, self.default_max_rounds());
        Span::current().record("max_rounds", max_rounds);

        let mut log = RoundLog::default();
        let mut state = RoundState::Initial;
        loop {
            state = match state {
                RoundState::Initial => {
                    let prompt = self
                        .prompts()
                        .deep_initial(topic, max_rounds)
                        .map_err(prompt_failure)?;
                    let outcome = self
                        .orchestrator()
                        .execute_with_retry(&prompt, DEEP_SEARCH_SCHEMA_EXAMPLE)
                        .await
                        .map_err(|err| initial_round_failure(&err))?;
                    if let AgentPayload::Failure { error, .. } = &outcome.payload {
                        return Err(ToolFailure::new(
                            codes::SEARCH_FAILED,
                            format!(
                                "deep search failed in round 1: {}",
                                error.as_deref().unwrap_or("agent reported failure")
                            ),
                        ));
                    }
                    log.record(1, outcome);
                    RoundState::after(1, log.verified, max_rounds)
                }
                RoundState::Verifying(round) => {
                    match self.run_verification(topic, &log.report, round, max_rounds).await {
                        Ok(outcome) => {
                            log.record(round, outcome);
                            RoundState::after(round, log.verified, max_rounds)
                        }
                        Err(RoundFailure::Soft(reason)) => log.stop_early(round, reason),
                        Err(RoundFailure::Fatal(failure)) => return Err(failure),
                    }
                }
                RoundState::Done(termination) => {
                    let model = self.models().label(log.detected_model.as_deref());
                    info!(
                        rounds = log.rounds.len(),
                        verified = log.verified,
                        termination = ?termination,
                        "deep search complete"
                    );
                    return Ok(log.finish(termination, max_rounds, model));
                }
            };
        }
    }

    /// One verification round.
    async fn run_verification(
        &self,
        topic: &str,
        report: &str,
        round: u32,
        max_rounds: u32,
    ) -> Result<RetryOutcome, RoundFailure> {
        let prompt = self
            .prompts()
            .deep_verify(topic, report, round, max_rounds)
            .map_err(|err| RoundFailure::Soft(error_chain(&err)))?;
        let outcome = self
            .orchestrator()
            .execute_with_retry(&prompt, DEEP_SEARCH_SCHEMA_EXAMPLE)
            .await
            .map_err(|err| match err {
                RetryError::AgentUnavailable(_) => RoundFailure::Fatal(ToolFailure::from_retry(
                    &format!("deep search stopped in round {round}"),
                    &err,
                )),
                RetryError::Exhausted { .. } => RoundFailure::Soft(error_chain(&err)),
            })?;
        match &outcome.payload {
            AgentPayload::Success { .. } => Ok(outcome),
            AgentPayload::Failure { error, .. } => Err(RoundFailure::Soft(
                error
                    .clone()
                    .unwrap_or_else(|| "agent reported failure".to_string()),
            )),
        }
    }
}

/// Why a verification round did not produce a report.
enum RoundFailure {
    /// The round failed; earlier rounds still stand.
    Soft(String),
    /// The agent is gone or shutdown was requested; the call fails.
    Fatal(ToolFailure),
}

fn initial_round_failure(err: &RetryError) -> ToolFailure {
    let mut failure = ToolFailure::from_retry("deep search failed in round 1", err);
    if matches!(err, RetryError::Exhausted { .. }) {
        failure.code = codes::SEARCH_FAILED.to_string();
    }
    failure
}
