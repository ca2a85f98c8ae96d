//! I/O helpers: agent processes, artifacts, prompts, and configuration.

pub mod agent;
pub mod artifact;
pub mod config;
pub mod process;
pub mod prompt;
