//! Run a child process with piped input, a deadline, and bounded output.
//!
//! The caller suspends until the child exits, the deadline passes, or a
//! shutdown is requested. On deadline or shutdown the child is asked to exit
//! (`SIGTERM` on Unix), given a grace window, then killed. Partial output from
//! a child that did not exit on its own is discarded.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProcessError;

/// Elapsed time after which a running child is reported as still working.
pub const PROGRESS_GRACE: Duration = Duration::from_secs(15);
/// Elapsed time after which progress reports escalate to warnings.
pub const PROGRESS_ESCALATE: Duration = Duration::from_secs(120);
const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
const READ_CHUNK_BYTES: usize = 8192;
/// Longest stderr line logged in full; the rest of the line is dropped.
const MAX_LOGGED_LINE: usize = 4096;

/// Limits applied to one child process.
#[derive(Debug, Clone)]
pub struct RunLimits {
    pub timeout: Duration,
    pub grace: Duration,
    pub output_limit_bytes: usize,
    pub progress_interval: Duration,
    /// Log stderr lines as they arrive.
    pub log_stderr: bool,
}

/// Captured output of a child that exited on its own.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr for error reports, with a marker when it was truncated.
    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[stderr truncated {} bytes]",
                self.stderr_truncated
            ));
        }
        text
    }
}

/// Tone of a progress report for a child that has been running `elapsed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLevel {
    Working,
    Slow,
}

pub fn progress_level(elapsed: Duration) -> Option<ProgressLevel> {
    if elapsed >= PROGRESS_ESCALATE {
        Some(ProgressLevel::Slow)
    } else if elapsed >= PROGRESS_GRACE {
        Some(ProgressLevel::Working)
    } else {
        None
    }
}

/// Spawn `cmd`, write `input` to its stdin, close stdin, and wait.
///
/// Stdout and stderr are drained concurrently so a chatty child never blocks on
/// a full pipe. `output_limit_bytes` bounds what is kept in memory.
#[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs(), input_len = input.len()))]
pub async fn run_command_with_deadline(
    mut cmd: Command,
    input: &[u8],
    limits: &RunLimits,
    shutdown: &CancellationToken,
) -> Result<CommandOutput, ProcessError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %program, "spawning child process");
    let mut child = cmd.spawn().map_err(|err| spawn_error(&program, err))?;
    let started = Instant::now();

    let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    let limit = limits.output_limit_bytes;
    let mut stdout_task = tokio::spawn(read_stream_limited(stdout, limit, None));
    let mut stderr_task = tokio::spawn(read_stream_limited(
        stderr,
        limit,
        limits.log_stderr.then_some("stderr"),
    ));

    // The deadline covers the exit and the pipe drain: a grandchild that keeps
    // stdout open must not outlive it.
    let run = async {
        let status = feed_and_wait(&mut child, stdin, input, started, limits.progress_interval)
            .await
            .map_err(|err| {
                error!(err = %err, "waiting on child failed");
                ProcessError::SpawnFailure {
                    reason: format!("wait for {program}: {err}"),
                }
            })?;
        let stdout = join_output(&mut stdout_task, "stdout").await?;
        let stderr = join_output(&mut stderr_task, "stderr").await?;
        Ok::<_, ProcessError>((status, stdout, stderr))
    };

    let finished = tokio::select! {
        result = time::timeout(limits.timeout, run) => Some(result),
        () = shutdown.cancelled() => None,
    };

    let (status, (stdout, stdout_truncated), (stderr, stderr_truncated)) = match finished {
        Some(Ok(Ok(done))) => done,
        Some(Ok(Err(err))) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(err);
        }
        Some(Err(_elapsed)) => {
            warn!(
                timeout_secs = limits.timeout.as_secs(),
                "child timed out, terminating"
            );
            stdout_task.abort();
            stderr_task.abort();
            terminate(&mut child, limits.grace).await;
            return Err(ProcessError::Timeout {
                after: limits.timeout,
            });
        }
        None => {
            warn!("shutdown requested, terminating child");
            stdout_task.abort();
            stderr_task.abort();
            terminate(&mut child, limits.grace).await;
            return Err(ProcessError::Interrupted);
        }
    };

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(
        exit_code = ?status.code(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "child finished"
    );
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
    })
}

async fn feed_and_wait(
    child: &mut Child,
    mut stdin: ChildStdin,
    input: &[u8],
    started: Instant,
    progress_interval: Duration,
) -> io::Result<ExitStatus> {
    if let Err(err) = stdin.write_all(input).await {
        // A child may exit without reading its input; the exit status decides.
        if err.kind() != io::ErrorKind::BrokenPipe {
            return Err(err);
        }
        debug!("child closed stdin before reading all input");
    }
    drop(stdin);

    let interval = progress_interval.max(MIN_PROGRESS_INTERVAL);
    let mut ticker = time::interval_at(started + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            status = child.wait() => return status,
            _ = ticker.tick() => report_progress(started.elapsed()),
        }
    }
}

fn report_progress(elapsed: Duration) {
    let elapsed_secs = elapsed.as_secs();
    match progress_level(elapsed) {
        Some(ProgressLevel::Slow) => {
            warn!(elapsed_secs, "agent still running, this is taking unusually long");
        }
        Some(ProgressLevel::Working) => info!(elapsed_secs, "agent still running"),
        None => {}
    }
}

/// Ask the child to exit, then kill it if it outlives `grace`.
async fn terminate(child: &mut Child, grace: Duration) {
    request_exit(child).await;
    match time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(exit_code = ?status.code(), "child exited after termination request"),
        Ok(Err(err)) => warn!(err = %err, "wait after termination request failed"),
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs(),
                "child ignored termination request, killing"
            );
            if let Err(err) = child.kill().await {
                error!(err = %err, "failed to kill child");
            }
        }
    }
}

#[cfg(unix)]
async fn request_exit(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let sent = Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match sent {
        Ok(status) if status.success() => debug!(pid, "sent SIGTERM"),
        Ok(status) => debug!(pid, exit_code = ?status.code(), "kill -TERM did not succeed"),
        Err(err) => {
            warn!(err = %err, "could not send SIGTERM, killing instead");
            if let Err(err) = child.start_kill() {
                error!(err = %err, "failed to kill child");
            }
        }
    }
}

#[cfg(not(unix))]
async fn request_exit(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        error!(err = %err, "failed to kill child");
    }
}

fn spawn_error(program: &str, err: io::Error) -> ProcessError {
    if err.kind() == io::ErrorKind::NotFound {
        error!(program, "agent binary not found");
        return ProcessError::NotFound {
            program: program.to_string(),
        };
    }
    error!(program, err = %err, "failed to spawn command");
    ProcessError::SpawnFailure {
        reason: format!("spawn {program}: {err}"),
    }
}

fn missing_pipe(name: &str) -> ProcessError {
    ProcessError::SpawnFailure {
        reason: format!("{name} was not piped"),
    }
}

async fn join_output(
    handle: &mut JoinHandle<io::Result<(Vec<u8>, usize)>>,
    name: &str,
) -> Result<(Vec<u8>, usize), ProcessError> {
    match handle.await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) => Err(ProcessError::SpawnFailure {
            reason: format!("read {name}: {err}"),
        }),
        Err(err) => Err(ProcessError::SpawnFailure {
            reason: format!("{name} reader failed: {err}"),
        }),
    }
}

/// Read a stream in fixed-size chunks, keeping at most `limit` bytes.
///
/// Bytes beyond the limit are counted and discarded while the pipe keeps
/// draining. With a `log_label`, each line is logged as it arrives.
async fn read_stream_limited<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
    log_label: Option<&'static str>,
) -> io::Result<(Vec<u8>, usize)> {
    let mut collected = Vec::new();
    let mut truncated = 0usize;
    let mut lines = log_label.map(LineLogger::new);
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let data = &chunk[..n];

        let keep = n.min(limit.saturating_sub(collected.len()));
        collected.extend_from_slice(&data[..keep]);
        truncated += n - keep;

        if let Some(lines) = lines.as_mut() {
            lines.feed(data);
        }
    }
    if let Some(lines) = lines.as_mut() {
        lines.flush();
    }

    Ok((collected, truncated))
}

/// Splits a byte stream into log lines, clipping each at `MAX_LOGGED_LINE`.
struct LineLogger {
    stream: &'static str,
    line: Vec<u8>,
}

impl LineLogger {
    fn new(stream: &'static str) -> Self {
        Self {
            stream,
            line: Vec::new(),
        }
    }

    fn feed(&mut self, data: &[u8]) {
        for piece in data.split_inclusive(|byte| *byte == b'\n') {
            let body = piece.strip_suffix(b"\n").unwrap_or(piece);
            let room = MAX_LOGGED_LINE.saturating_sub(self.line.len());
            self.line.extend_from_slice(&body[..body.len().min(room)]);
            if piece.ends_with(b"\n") {
                self.flush();
            }
        }
    }

    fn flush(&mut self) {
        if !self.line.is_empty() {
            info!(
                stream = self.stream,
                line = %String::from_utf8_lossy(&self.line).trim_end(),
                "agent output"
            );
        }
        self.line.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_silent_during_grace_period() {
        assert_eq!(progress_level(Duration::from_secs(5)), None);
        assert_eq!(
            progress_level(Duration::from_secs(15)),
            Some(ProgressLevel::Working)
        );
        assert_eq!(
            progress_level(Duration::from_secs(119)),
            Some(ProgressLevel::Working)
        );
        assert_eq!(
            progress_level(Duration::from_secs(121)),
            Some(ProgressLevel::Slow)
        );
    }

    #[tokio::test]
    async fn read_stream_limited_counts_dropped_bytes() {
        let input: &[u8] = b"abc\ndef\nghi\n";
        let (kept, truncated) = read_stream_limited(input, 5, None).await.expect("read");
        assert_eq!(kept, b"abc\nd");
        assert_eq!(truncated, 7);
    }

    #[tokio::test]
    async fn read_stream_limited_bounds_output_without_newlines() {
        let input = vec![b'x'; 100_000];
        let (kept, truncated) = read_stream_limited(&input[..], 1_000, Some("stderr"))
            .await
            .expect("read");
        assert_eq!(kept.len(), 1_000);
        assert_eq!(truncated, 99_000);
    }

    #[test]
    fn logged_lines_are_clipped_and_joined_across_chunks() {
        let mut lines = LineLogger::new("stderr");
        lines.feed(&[b'y'; MAX_LOGGED_LINE * 3]);
        assert_eq!(lines.line.len(), MAX_LOGGED_LINE);
        lines.feed(b"tail\nnext");
        assert_eq!(lines.line, b"next");
        lines.feed(b" part");
        assert_eq!(lines.line, b"next part");
    }

    #[tokio::test]
    async fn read_stream_limited_keeps_unterminated_tail() {
        let input: &[u8] = b"line\ntail";
        let (kept, truncated) = read_stream_limited(input, 100, Some("stderr"))
            .await
            .expect("read");
        assert_eq!(kept, b"line\ntail");
        assert_eq!(truncated, 0);
    }

    #[test]
    fn stderr_text_marks_truncation() {
        let output = CommandOutput {
            status: ExitStatus::default(),
            stdout: Vec::new(),
            stderr: b"boom\n".to_vec(),
            stdout_truncated: 0,
            stderr_truncated: 12,
        };
        assert_eq!(output.stderr_text(), "boom\n[stderr truncated 12 bytes]");
    }

    #[test]
    fn missing_binary_is_not_found() {
        let err = spawn_error("claude", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ProcessError::NotFound { program } if program == "claude"));

        let err = spawn_error("claude", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, ProcessError::SpawnFailure { .. }));
    }
}
