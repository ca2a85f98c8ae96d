//! Test-only helpers: scripted agents and throwaway workspaces.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::error::ProcessError;
use crate::io::agent::{Agent, AgentRequest};
use crate::io::artifact::is_artifact_file_name;
use crate::io::config::{RetryConfig, SearcherConfig};
use crate::io::prompt::CORRECTION_MARKER;

static ARTIFACT_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\S*correction-input-\d+-\d+-\d+\.txt)").expect("artifact path regex")
});

/// One scripted agent response.
#[derive(Debug)]
pub enum Reply {
    Output(String),
    Fail(ProcessError),
}

impl Reply {
    /// Raw text, returned verbatim.
    pub fn text(text: &str) -> Self {
        Self::Output(text.to_string())
    }

    /// `value` wrapped in chatter and a fenced json block.
    pub fn payload(value: Value) -> Self {
        Self::Output(format!(
            "I looked into it.\n\n```json\n{}\n```\n\nLet me know if you need more.",
            serde_json::to_string_pretty(&value).unwrap_or_default()
        ))
    }

    /// Successful single-round payload.
    pub fn report(report: &str, sources: &[&str]) -> Self {
        Self::payload(json!({
            "success": true,
            "report": report,
            "sources": sources,
            "queries": [format!("query for {report}")],
        }))
    }

    /// Successful deep-search round payload.
    pub fn round(report: &str, verified: bool, sources: &[&str]) -> Self {
        Self::payload(json!({
            "success": true,
            "report": report,
            "verified": verified,
            "sources": sources,
            "queries": [format!("query for {report}")],
        }))
    }

    pub fn timeout() -> Self {
        Self::Fail(ProcessError::Timeout {
            after: Duration::from_secs(1),
        })
    }

    pub fn not_found() -> Self {
        Self::Fail(ProcessError::NotFound {
            program: "claude".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Main,
    Correction,
}

/// A request observed by [`ScriptedAgent`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub prompt: String,
    pub model: Option<String>,
    /// Artifact path named in a correction prompt.
    pub artifact_path: Option<PathBuf>,
    /// Whether that artifact existed while the call ran.
    pub artifact_existed: bool,
}

/// Agent that replays queued replies instead of spawning processes.
///
/// Main and correction calls draw from separate queues. An empty queue yields
/// a spawn failure so over-calling shows up as an error, not a hang.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    main: Mutex<VecDeque<Reply>>,
    corrections: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedAgent {
    pub fn new(main: Vec<Reply>, corrections: Vec<Reply>) -> Self {
        Self {
            main: Mutex::new(main.into()),
            corrections: Mutex::new(corrections.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls().iter().filter(|call| call.kind == kind).count()
    }

    pub fn prompts(&self, kind: CallKind) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.kind == kind)
            .map(|call| call.prompt)
            .collect()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn run(&self, request: &AgentRequest) -> Result<String, ProcessError> {
        let kind = if request.prompt.starts_with(CORRECTION_MARKER) {
            CallKind::Correction
        } else {
            CallKind::Main
        };
        let artifact_path = match kind {
            CallKind::Correction => ARTIFACT_PATH_RE
                .captures(&request.prompt)
                .and_then(|caps| caps.get(1))
                .map(|path| PathBuf::from(path.as_str())),
            CallKind::Main => None,
        };
        let artifact_existed = artifact_path.as_deref().is_some_and(Path::exists);
        self.calls.lock().expect("calls lock").push(RecordedCall {
            kind,
            prompt: request.prompt.clone(),
            model: request.model.clone(),
            artifact_path,
            artifact_existed,
        });

        let queue = match kind {
            CallKind::Main => &self.main,
            CallKind::Correction => &self.corrections,
        };
        let reply = queue.lock().expect("reply lock").pop_front();
        match reply {
            Some(Reply::Output(text)) => Ok(text),
            Some(Reply::Fail(err)) => Err(err),
            None => Err(ProcessError::SpawnFailure {
                reason: format!("no scripted reply left for {kind:?} call"),
            }),
        }
    }
}

/// Temporary directory holding a searcher work dir.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    /// Config rooted in this workspace with no backoff delays.
    pub fn config(&self) -> SearcherConfig {
        SearcherConfig {
            work_dir: self.work_dir(),
            retry: RetryConfig {
                max_attempts: 3,
                backoff_ms: vec![0],
            },
            ..SearcherConfig::default()
        }
    }

    /// Correction artifacts currently present in the work dir.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.work_dir()) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(is_artifact_file_name)
            })
            .map(|entry| entry.path())
            .collect()
    }
}
