//! Searcher configuration stored in `.searcher/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::rounds::clamp_default_rounds;

/// Default location of the config file, relative to the invocation directory.
pub const DEFAULT_CONFIG_PATH: &str = ".searcher/config.toml";

/// Searcher configuration (TOML).
///
/// Read once at startup and passed by reference to every component. Missing
/// fields default to values that work with a stock `claude` install.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearcherConfig {
    /// Working directory for agent processes and correction artifacts.
    pub work_dir: PathBuf,

    pub agent: AgentConfig,

    pub retry: RetryConfig,

    pub deep_search: DeepSearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent binary, resolved through `PATH`.
    pub command: String,

    /// Arguments passed before the model and tool flags.
    pub args: Vec<String>,

    /// Value for `--allowedTools`; an empty string drops the flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<String>,

    /// Model for search calls. Unset lets the agent pick its own default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Model for correction calls. Falls back to `model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_model: Option<String>,

    /// Wall-clock budget for one agent call.
    pub timeout_secs: u64,

    /// Time between the termination request and a forced kill.
    pub grace_secs: u64,

    /// Cap on captured stdout/stderr per call.
    pub output_limit_bytes: usize,

    /// How often to report that a long-running agent is still working.
    pub progress_interval_secs: u64,

    /// Log agent stderr lines as they arrive.
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["--print".to_string()],
            allowed_tools: Some("WebSearch,WebFetch,Read".to_string()),
            model: None,
            correction_model: None,
            timeout_secs: 10 * 60,
            grace_secs: 5,
            output_limit_bytes: 2_000_000,
            progress_interval_secs: 15,
            verbose: false,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn correction_model(&self) -> Option<&str> {
        self.correction_model.as_deref().or(self.model.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of cycles (main call plus one correction) per request.
    pub max_attempts: u32,

    /// Delays between cycles in milliseconds; the last entry repeats.
    pub backoff_ms: Vec<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: vec![1_000, 2_000, 5_000],
        }
    }
}

impl RetryConfig {
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        self.backoff_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeepSearchConfig {
    /// Round budget when a caller does not ask for one.
    pub default_max_rounds: u32,
}

impl Default for DeepSearchConfig {
    fn default() -> Self {
        Self {
            default_max_rounds: 5,
        }
    }
}

impl Default for SearcherConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(".searcher"),
            agent: AgentConfig::default(),
            retry: RetryConfig::default(),
            deep_search: DeepSearchConfig::default(),
        }
    }
}

impl SearcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.work_dir.as_os_str().is_empty() {
            return Err(anyhow!("work_dir must be non-empty"));
        }
        if self.agent.command.trim().is_empty() {
            return Err(anyhow!("agent.command must be non-empty"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.agent.progress_interval_secs == 0 {
            return Err(anyhow!("agent.progress_interval_secs must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        Ok(())
    }

    /// Clamp externally supplied values into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.deep_search.default_max_rounds =
            clamp_default_rounds(self.deep_search.default_max_rounds);
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SearcherConfig::default()`.
pub fn load_config(path: &Path) -> Result<SearcherConfig> {
    if !path.exists() {
        let cfg = SearcherConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SearcherConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg.normalized())
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SearcherConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SearcherConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/config.toml");
        let cfg = SearcherConfig {
            agent: AgentConfig {
                model: Some("sonnet".to_string()),
                ..AgentConfig::default()
            },
            ..SearcherConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[agent]\ntimeout_secs = 30\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.agent.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.agent.command, "claude");
        assert_eq!(cfg.retry.max_attempts, 3);
    }

    #[test]
    fn default_rounds_are_clamped_on_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[deep_search]\ndefault_max_rounds = 1\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.deep_search.default_max_rounds, 2);
    }

    #[test]
    fn rejects_zero_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[agent]\ntimeout_secs = 0\n").expect("write");

        let err = load_config(&path).expect_err("zero timeout");
        assert!(format!("{err:#}").contains("timeout_secs"));
    }

    #[test]
    fn correction_model_falls_back_to_main_model() {
        let mut agent = AgentConfig {
            model: Some("main".to_string()),
            ..AgentConfig::default()
        };
        assert_eq!(agent.correction_model(), Some("main"));
        agent.correction_model = Some("fixer".to_string());
        assert_eq!(agent.correction_model(), Some("fixer"));
        assert_eq!(AgentConfig::default().correction_model(), None);
    }

    #[test]
    fn backoff_schedule_is_in_millis() {
        let retry = RetryConfig::default();
        assert_eq!(
            retry.backoff_schedule(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5)
            ]
        );
    }
}
