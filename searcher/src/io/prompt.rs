//! Prompt rendering for search, deep-search, and correction calls.

use std::path::Path;

use minijinja::{Environment, Error, context};

const SEARCH_TEMPLATE: &str = include_str!("prompts/search.md");
const DEEP_INITIAL_TEMPLATE: &str = include_str!("prompts/deep_initial.md");
const DEEP_VERIFY_TEMPLATE: &str = include_str!("prompts/deep_verify.md");
const CORRECTION_TEMPLATE: &str = include_str!("prompts/correction.md");

/// Example payload for single-round searches.
pub const SEARCH_SCHEMA_EXAMPLE: &str = r##"{
  "success": true,
  "report": "# Title\n\nMarkdown report...",
  "sources": ["https://example.com/article"],
  "queries": ["first search query"]
}"##;

/// Example payload for deep-search rounds.
pub const DEEP_SEARCH_SCHEMA_EXAMPLE: &str = r##"{
  "success": true,
  "report": "# Title\n\nMarkdown report...",
  "verified": false,
  "sources": ["https://example.com/article"],
  "queries": ["first search query"]
}"##;

/// Phrase that opens every correction prompt.
pub const CORRECTION_MARKER: &str = "You are a JSON repair specialist";

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("search", SEARCH_TEMPLATE)
            .expect("search template should be valid");
        env.add_template("deep_initial", DEEP_INITIAL_TEMPLATE)
            .expect("deep_initial template should be valid");
        env.add_template("deep_verify", DEEP_VERIFY_TEMPLATE)
            .expect("deep_verify template should be valid");
        env.add_template("correction", CORRECTION_TEMPLATE)
            .expect("correction template should be valid");
        Self { env }
    }

    pub fn search(&self, query: &str) -> Result<String, Error> {
        self.env.get_template("search")?.render(context! {
            query => query.trim(),
            schema => SEARCH_SCHEMA_EXAMPLE,
        })
    }

    pub fn deep_initial(&self, topic: &str, max_rounds: u32) -> Result<String, Error> {
        self.env.get_template("deep_initial")?.render(context! {
            topic => topic.trim(),
            max_rounds => max_rounds,
            schema => DEEP_SEARCH_SCHEMA_EXAMPLE,
        })
    }

    /// Verification prompt for `round` (2-indexed onward) of `max_rounds`.
    pub fn deep_verify(
        &self,
        topic: &str,
        report: &str,
        round: u32,
        max_rounds: u32,
    ) -> Result<String, Error> {
        self.env.get_template("deep_verify")?.render(context! {
            topic => topic.trim(),
            report => report.trim(),
            round => round,
            max_rounds => max_rounds,
            remaining => max_rounds.saturating_sub(round),
            schema => DEEP_SEARCH_SCHEMA_EXAMPLE,
        })
    }

    pub fn correction(&self, schema_example: &str, artifact_path: &Path) -> Result<String, Error> {
        self.env.get_template("correction")?.render(context! {
            schema => schema_example,
            artifact_path => artifact_path.display().to_string(),
        })
    }
}
