//! Structured web research through an external CLI agent.
//!
//! The crate spawns an agent process, pipes a prompt to it, and turns the
//! free-form reply into a validated JSON payload. Invalid replies get one
//! repair call per cycle; cycles are retried with backoff. Deep searches chain
//! verification rounds until the agent declares its report verified.
//!
//! - **[`core`]**: Pure logic (extraction, validation, payloads, round
//!   bookkeeping). No I/O.
//! - **[`io`]**: Side effects (child processes, artifacts, prompts, config).
//!
//! Orchestration modules ([`correction`], [`retry`], [`search`],
//! [`deep_search`]) combine the two behind the [`search::Searcher`] facade.

pub mod core;
pub mod correction;
pub mod deep_search;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod retry;
pub mod search;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
