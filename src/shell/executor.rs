//! One-shot command execution through the host shell.
//!
//! Unlike an argv exec, the command line is handed to `<shell> -c`, so
//! pipes, redirects, `;`, globs and the rest of shell syntax all work. This
//! is the remote-shell capability itself; gating it is the job of
//! [`crate::security`], not of this module.
//!
//! - stdout and stderr share one pipe (interleaving is preserved)
//! - time-bounded (optional); the whole process group is killed on expiry
//! - output-bounded

use std::io;
use std::os::fd::OwnedFd;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::unix::pipe;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{DEFAULT_EXEC_TIMEOUT_SECS, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_SHELL};

/// Appended to output cut at `max_output_bytes`.
pub const TRUNCATION_MARKER: &str = "...(truncated)";

const READ_CHUNK: usize = 8 * 1024;

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Shell binary invoked as `<shell> -c <command>`.
    pub shell: String,
    /// Per-command deadline. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Max bytes captured per command (stdout + stderr combined).
    pub max_output_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_EXEC_TIMEOUT_SECS)),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to start {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to capture command output: {0}")]
    Capture(#[from] io::Error),
}

/// How the command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exited(ExitStatus),
    /// Killed after running past the deadline.
    TimedOut(Duration),
}

/// Captured combined output of one command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub output: String,
    pub outcome: Outcome,
    pub truncated: bool,
}

impl CommandResult {
    pub fn timed_out(&self) -> bool {
        matches!(self.outcome, Outcome::TimedOut(_))
    }

    /// Exit code, when the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            Outcome::Exited(status) => status.code(),
            Outcome::TimedOut(_) => None,
        }
    }
}

/// Runs commands through the configured shell. Cheap to clone; holds no
/// per-command state, so sessions can share one or own one each.
#[derive(Clone, Debug, Default)]
pub struct ShellExecutor {
    cfg: ExecutorConfig,
}

impl ShellExecutor {
    pub fn new(cfg: ExecutorConfig) -> Self {
        Self { cfg }
    }

    /// Execute `command_line` and wait for it to finish (or be killed).
    ///
    /// Failures inside the shell (unknown command, bad syntax, non-zero exit)
    /// are not errors here: they show up as output text and an exit status.
    /// Only a shell that cannot be started at all is reported as `Err`.
    pub async fn run(&self, command_line: &str) -> Result<CommandResult, ExecError> {
        // One pipe behind both stdout and stderr, so the shell's own
        // diagnostics interleave with command output in write order.
        let (reader, writer) = io::pipe()?;
        let stderr_writer = writer.try_clone()?;

        let mut command = Command::new(&self.cfg.shell);
        command
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(stderr_writer))
            .process_group(0)
            .kill_on_drop(true);
        let spawned = command.spawn();
        // The command still holds our copies of the write end; the pipe only
        // reaches EOF once they are closed.
        drop(command);
        let mut child = spawned.map_err(|source| ExecError::Spawn {
            shell: self.cfg.shell.clone(),
            source,
        })?;
        let mut group = ProcessGroup::of(child.id());

        let mut output_pipe = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;

        let mut captured = Vec::new();
        let mut truncated = false;
        let limit = self.cfg.max_output_bytes;

        let outcome = {
            let run = async {
                truncated = read_bounded(&mut output_pipe, &mut captured, limit).await?;
                child.wait().await
            };
            match self.cfg.timeout {
                Some(deadline) => match timeout(deadline, run).await {
                    Ok(status) => Some(status?),
                    Err(_) => None,
                },
                None => Some(run.await?),
            }
        };

        let outcome = match outcome {
            Some(status) => {
                debug!(?status, bytes = captured.len(), "command finished");
                // Background jobs that outlive the shell are left alone.
                group.release();
                Outcome::Exited(status)
            }
            None => {
                let deadline = self.cfg.timeout.unwrap_or_default();
                warn!(?deadline, "command exceeded deadline, killing its process group");
                group.kill();
                if let Err(e) = child.kill().await {
                    warn!("failed to kill timed out command: {}", e);
                }
                Outcome::TimedOut(deadline)
            }
        };

        let mut output = String::from_utf8_lossy(&captured).into_owned();
        if truncated {
            if !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(TRUNCATION_MARKER);
        }

        Ok(CommandResult {
            output,
            outcome,
            truncated,
        })
    }
}

/// Process group led by a spawned shell. Every process the command starts
/// (pipelines, subshells, `&` jobs) joins it unless it sets up its own.
///
/// The group is SIGKILLed when dropped while still held, so a session that
/// goes away mid-command does not leave its jobs behind.
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn of(leader: Option<u32>) -> Self {
        let pgid = leader
            .and_then(|pid| i32::try_from(pid).ok())
            .map(Pid::from_raw);
        Self { pgid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            match killpg(pgid, Signal::SIGKILL) {
                Ok(()) => debug!(%pgid, "killed process group"),
                Err(e) => debug!(%pgid, "could not kill process group: {}", e),
            }
        }
    }

    fn release(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Read `reader` to end-of-stream, keeping at most `limit` bytes in `out`.
///
/// Bytes past the limit are drained and discarded so the child never blocks
/// on a full pipe. Returns whether anything was discarded. The cut is moved
/// back to a UTF-8 boundary when it would split a character.
async fn read_bounded<R>(reader: &mut R, out: &mut Vec<u8>, limit: usize) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    let mut truncated = false;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(out.len());
        if n > room {
            out.extend_from_slice(&buf[..room]);
            truncated = true;
        } else {
            out.extend_from_slice(&buf[..n]);
        }
    }
    if truncated {
        let keep = utf8_boundary(out);
        out.truncate(keep);
    }
    Ok(truncated)
}

/// Length of the longest prefix of `bytes` that does not end mid-character.
fn utf8_boundary(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => bytes.len(),
    }
}
