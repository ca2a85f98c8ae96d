//! Correction artifacts: temp files that hand invalid output to a repair call.
//!
//! An artifact exists exactly as long as its [`CorrectionArtifact`] value. Files
//! orphaned by a crashed process are removed by [`sweep_stale_artifacts`].

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};

static ARTIFACT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^correction-input-\d+-\d+-\d+\.txt$").expect("artifact name regex should be valid")
});

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// File name for an artifact: `correction-input-<unix-ms>-<pid>-<seq>.txt`.
pub fn artifact_file_name(timestamp_ms: i64, pid: u32, seq: u64) -> String {
    format!("correction-input-{timestamp_ms}-{pid}-{seq}.txt")
}

/// Whether `name` was produced by [`artifact_file_name`].
pub fn is_artifact_file_name(name: &str) -> bool {
    ARTIFACT_NAME_RE.is_match(name)
}

/// A temp file holding one invalid agent output. Removed on drop.
#[derive(Debug)]
pub struct CorrectionArtifact {
    path: PathBuf,
}

impl CorrectionArtifact {
    /// Write `contents` to a new, uniquely named file under `dir`.
    pub fn create(dir: &Path, contents: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let name = artifact_file_name(
            Utc::now().timestamp_millis(),
            std::process::id(),
            SEQUENCE.fetch_add(1, Ordering::Relaxed),
        );
        let path = std::path::absolute(dir.join(name))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        let artifact = Self { path };
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        debug!(path = %artifact.path.display(), bytes = contents.len(), "wrote correction artifact");
        Ok(artifact)
    }

    /// Absolute path of the artifact file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CorrectionArtifact {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed correction artifact"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                err = %err,
                "failed to remove correction artifact"
            ),
        }
    }
}

/// Remove artifacts left behind by a previous run.
///
/// A missing `dir` is not an error. Returns the number of files removed;
/// files that cannot be removed are logged and skipped.
pub fn sweep_stale_artifacts(dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "no work dir yet, nothing to sweep");
            return Ok(0);
        }
        Err(err) => return Err(err).with_context(|| format!("read dir {}", dir.display())),
    };

    let mut removed = 0usize;
    for entry in entries {
        let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_artifact_file_name(name) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => warn!(path = %entry.path().display(), err = %err, "failed to sweep artifact"),
        }
    }

    if removed > 0 {
        info!(removed, dir = %dir.display(), "swept stale correction artifacts");
    }
    Ok(removed)
}
