//! Round bookkeeping for multi-round deep searches.

use std::collections::HashSet;

use serde::Serialize;

/// Lower bound for the configured default round budget.
pub const MIN_DEFAULT_ROUNDS: u32 = 2;
/// Upper bound for any round budget, requested or configured.
pub const MAX_ROUNDS: u32 = 10;

/// Metadata recorded at the end of each successful round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundRecord {
    /// 1-indexed round number.
    pub round: u32,
    pub sources: Vec<String>,
    pub queries: Vec<String>,
    pub verified: bool,
}

/// Insertion-ordered set of source URLs.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl SourceSet {
    pub fn extend<I: IntoIterator<Item = String>>(&mut self, sources: I) {
        for source in sources {
            if self.seen.insert(source.clone()) {
                self.ordered.push(source);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

/// Clamp a configured default round budget into `MIN_DEFAULT_ROUNDS..=MAX_ROUNDS`.
pub fn clamp_default_rounds(configured: u32) -> u32 {
    configured.clamp(MIN_DEFAULT_ROUNDS, MAX_ROUNDS)
}

/// Resolve the round budget for one deep search.
///
/// A caller may ask for a single round; zero is raised to one.
pub fn resolve_max_rounds(requested: Option<u32>, default_rounds: u32) -> u32 {
    match requested {
        Some(rounds) => rounds.clamp(1, MAX_ROUNDS),
        None => clamp_default_rounds(default_rounds),
    }
}
