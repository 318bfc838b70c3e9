//! Process runner: spawn one external command under a deadline.
//!
//! ## Lifecycle
//!
//! ```text
//! spawn (own process group) ──┬── wait() finishes first ──▶ classify exit status
//!                             └── deadline fires first  ──▶ SIGKILL group, reap, CommandTimeout
//! ```
//!
//! Conversion tools fork helpers (LibreOffice starts `soffice.bin`, wrappers
//! start the real binary). Killing only the direct child would leave those
//! running, so on unix every command gets its own process group and the
//! whole group is killed:
//!
//! * when the deadline fires, before the leader is reaped,
//! * after a normal exit, if stragglers still hold our pipes,
//! * when the future is dropped mid-run (drop guard).
//!
//! Once the leader is reaped and the pipes are closed the group may be empty,
//! and its id can be handed to an unrelated process. The group is not
//! signalled after that point.
//!
//! stdout and stderr are drained concurrently so a chatty tool can never
//! block on a full pipe. They are kept for diagnostics only.

use crate::error::ConvertError;
use crate::template::CommandLine;
use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bytes of stdout/stderr kept per stream (the tail is kept).
const MAX_CAPTURED_BYTES: usize = 8 * 1024;

/// How long to wait for pipe readers after the process group is gone.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Diagnostics of a single process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code; `None` if killed by a signal or timed out.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    /// The deadline fired and the process group was killed.
    pub timed_out: bool,
}

impl ProcessOutcome {
    /// Exited on its own with status 0.
    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }

    /// stderr, falling back to stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            self.stderr.clone()
        }
    }
}

/// Run `command`, classifying the result.
///
/// * `timeout_secs == 0` → [`ConvertError::CommandTimeout`] without spawning.
/// * spawn failure or non-zero exit → [`ConvertError::CommandExecution`].
/// * deadline reached → [`ConvertError::CommandTimeout`], after the process
///   group has been killed and reaped.
pub async fn run(
    command: &CommandLine,
    timeout_secs: u64,
) -> Result<ProcessOutcome, ConvertError> {
    let shown = command.to_string();

    if timeout_secs == 0 {
        warn!("Not running '{}': timeout is 0 seconds", shown);
        return Err(ConvertError::CommandTimeout {
            command: shown,
            timeout_secs,
        });
    }

    debug!("Running '{}' (timeout {}s)", shown, timeout_secs);
    let outcome = execute(command, Duration::from_secs(timeout_secs))
        .await
        .map_err(|e| {
            warn!("Failed to start '{}': {}", shown, e);
            ConvertError::CommandExecution {
                command: shown.clone(),
                status: None,
                output: e.to_string(),
            }
        })?;

    if outcome.timed_out {
        warn!("'{}' killed after {}s timeout", shown, timeout_secs);
        return Err(ConvertError::CommandTimeout {
            command: shown,
            timeout_secs,
        });
    }

    if !outcome.success() {
        warn!(
            "'{}' exited with {:?} after {:?}",
            shown, outcome.status, outcome.elapsed
        );
        return Err(ConvertError::CommandExecution {
            command: shown,
            status: outcome.status,
            output: outcome.diagnostic(),
        });
    }

    debug!("'{}' finished in {:?}", shown, outcome.elapsed);
    Ok(outcome)
}

/// Split a raw command string with shell-word rules and [`run`] it.
pub async fn run_command_line(
    line: &str,
    timeout_secs: u64,
) -> Result<ProcessOutcome, ConvertError> {
    let command = CommandLine::parse(line)?;
    run(&command, timeout_secs).await
}

/// Spawn `command` and race it against `timeout`, without classifying.
///
/// Returns `Err` only when the process cannot be started or waited on.
pub async fn execute(command: &CommandLine, timeout: Duration) -> io::Result<ProcessOutcome> {
    let start = Instant::now();

    let mut std_cmd = std::process::Command::new(&command.program);
    std_cmd
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }

    let mut child = Command::from(std_cmd).kill_on_drop(true).spawn()?;
    let mut group = GroupGuard::new(child.id());

    let mut stdout = Pipe::spawn(child.stdout.take());
    let mut stderr = Pipe::spawn(child.stderr.take());

    let status = tokio::select! {
        status = child.wait() => Some(status?),
        _ = tokio::time::sleep(timeout) => None,
    };

    let timed_out = status.is_none();
    if timed_out {
        // The leader is not reaped yet, so its pid still names our group.
        group.kill();
        if let Err(e) = child.kill().await {
            warn!("Failed to kill timed-out process: {}", e);
        }
    }

    let (out_closed, err_closed) = tokio::join!(
        stdout.settle(PIPE_DRAIN_GRACE),
        stderr.settle(PIPE_DRAIN_GRACE)
    );
    if !(out_closed && err_closed) {
        // A straggler in the group holds a pipe, so the group id is still taken.
        debug!("Killing stragglers of '{}'", command.program.to_string_lossy());
        group.kill();
        tokio::join!(
            stdout.settle(PIPE_DRAIN_GRACE),
            stderr.settle(PIPE_DRAIN_GRACE)
        );
    }
    // The group may be empty from here on and its id free for reuse.
    group.disarm();

    Ok(ProcessOutcome {
        status: status.and_then(|s| s.code()),
        stdout: stdout.into_text(),
        stderr: stderr.into_text(),
        elapsed: start.elapsed(),
        timed_out,
    })
}

async fn capture<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut kept: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                kept.extend_from_slice(&chunk[..n]);
                if kept.len() > 2 * MAX_CAPTURED_BYTES {
                    kept.drain(..kept.len() - MAX_CAPTURED_BYTES);
                }
            }
        }
    }
    tail(&kept)
}

fn tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(MAX_CAPTURED_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

/// One captured output stream of the child.
enum Pipe {
    Reading(JoinHandle<String>),
    Closed(String),
}

impl Pipe {
    fn spawn<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        match reader {
            Some(r) => Pipe::Reading(tokio::spawn(capture(r))),
            None => Pipe::Closed(String::new()),
        }
    }

    /// Wait up to `grace` for EOF. `false` if some process still holds the pipe.
    async fn settle(&mut self, grace: Duration) -> bool {
        let Pipe::Reading(handle) = self else {
            return true;
        };
        let joined = tokio::time::timeout(grace, &mut *handle).await;
        match joined {
            Ok(text) => {
                *self = Pipe::Closed(text.unwrap_or_default());
                true
            }
            Err(_) => false,
        }
    }

    fn into_text(self) -> String {
        match self {
            Pipe::Closed(text) => text,
            Pipe::Reading(handle) => {
                // Held open by a process outside our group.
                handle.abort();
                String::new()
            }
        }
    }
}

/// Kills the child's process group once, at the latest on drop.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        // ESRCH: the group is already gone.
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!("killpg({}) failed: {}", pgid, err);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {
    // No process groups; `kill_on_drop` and `Child::kill` cover the direct child.
}
