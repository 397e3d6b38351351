//! The per-connection read / execute / reply loop.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tracing::{debug, info, warn};

use crate::protocol::{
    self, Control, DENIED_PREFIX, ERROR_PREFIX, FAREWELL, GREETING, LINE_TERMINATOR, LineError,
    PROMPT, Request,
};
use crate::security::{CommandPolicy, TrustedRemoteExec, Verdict};
use crate::shell::{Outcome, ShellExecutor};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent `exit` or `quit`.
    Control(Control),
    /// Client closed its side of the connection.
    Disconnected,
    /// Client sent a line longer than the configured maximum.
    LineTooLong,
    /// Reading from the connection failed.
    ReadFailed,
    /// Writing to the connection failed.
    WriteFailed,
}

impl SessionEnd {
    /// Whether the connection may still accept the farewell line.
    fn can_say_goodbye(self) -> bool {
        matches!(
            self,
            SessionEnd::Control(_) | SessionEnd::Disconnected | SessionEnd::LineTooLong
        )
    }
}

#[derive(Debug, Error)]
enum SessionError {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// Serves the remote shell protocol on accepted connections.
///
/// Holds only immutable settings, so one instance is shared by every
/// session; each call to [`serve`](Self::serve) owns its own connection and
/// nothing else.
#[derive(Debug, Clone)]
pub struct CommandShellServer {
    executor: ShellExecutor,
    policy: Arc<dyn CommandPolicy>,
    max_line_bytes: usize,
}

impl CommandShellServer {
    pub fn new(
        executor: ShellExecutor,
        policy: Arc<dyn CommandPolicy>,
        max_line_bytes: usize,
    ) -> Self {
        Self {
            executor,
            policy,
            max_line_bytes,
        }
    }

    /// Unrestricted shell with default executor limits.
    pub fn trusted(executor: ShellExecutor) -> Self {
        Self::new(executor, Arc::new(TrustedRemoteExec), crate::config::DEFAULT_MAX_LINE_BYTES)
    }

    pub fn policy(&self) -> &dyn CommandPolicy {
        self.policy.as_ref()
    }

    /// Run one session to completion on `conn`.
    ///
    /// Never fails: transport problems end the session and are reported
    /// through the returned [`SessionEnd`] and the log.
    pub async fn serve<S>(&self, conn: S) -> SessionEnd
    where
        S: AsyncRead + AsyncWrite,
    {
        let (reader, writer) = tokio::io::split(conn);
        let mut session = Session {
            shell: self,
            reader: BufReader::new(reader),
            writer,
        };

        let end = match session.run().await {
            Ok(end) => end,
            Err(SessionError::Read(e)) => {
                warn!("session read error: {}", e);
                SessionEnd::ReadFailed
            }
            Err(SessionError::Write(e)) => {
                debug!("session write error: {}", e);
                SessionEnd::WriteFailed
            }
        };

        if end.can_say_goodbye() {
            if let Err(e) = session.write_line(FAREWELL).await {
                debug!("could not send farewell: {}", e);
            }
        }
        if let Err(e) = session.writer.shutdown().await {
            debug!("shutdown failed: {}", e);
        }
        end
    }

    /// Policy check, execution and reply formatting for one command.
    /// `None` means nothing is written back.
    async fn execute(&self, cmd: &str) -> Option<String> {
        if let Verdict::Deny { reason } = self.policy.evaluate(cmd) {
            info!(command = %cmd, policy = self.policy.name(), %reason, "command denied");
            return Some(format!("{}{}{}", DENIED_PREFIX, reason, LINE_TERMINATOR));
        }

        let result = match self.executor.run(cmd).await {
            Ok(result) => result,
            Err(e) => {
                warn!(command = %cmd, "command could not be started: {}", e);
                return Some(format!("{}{}{}", ERROR_PREFIX, e, LINE_TERMINATOR));
            }
        };

        info!(
            command = %cmd,
            exit_code = ?result.exit_code(),
            timed_out = result.timed_out(),
            truncated = result.truncated,
            "command executed"
        );

        match result.outcome {
            Outcome::Exited(_) => protocol::format_reply(&result.output),
            Outcome::TimedOut(deadline) => {
                let mut reply = result.output.trim_end().to_string();
                if !reply.is_empty() {
                    reply.push_str(LINE_TERMINATOR);
                }
                reply.push_str(&protocol::timeout_marker(deadline));
                reply.push_str(LINE_TERMINATOR);
                Some(reply)
            }
        }
    }
}

/// One accepted connection. Lives for exactly one call to `serve`.
struct Session<'a, S> {
    shell: &'a CommandShellServer,
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl<S> Session<'_, S>
where
    S: AsyncRead + AsyncWrite,
{
    async fn run(&mut self) -> Result<SessionEnd, SessionError> {
        self.write_line(GREETING).await.map_err(SessionError::Write)?;

        loop {
            self.write_chunk(PROMPT).await.map_err(SessionError::Write)?;

            let max_len = self.shell.max_line_bytes;
            let line = match protocol::read_request_line(&mut self.reader, max_len).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("client closed the connection");
                    return Ok(SessionEnd::Disconnected);
                }
                Err(LineError::TooLong { limit }) => {
                    warn!(limit, "request line too long, closing session");
                    let notice = format!("{}request line exceeds {} bytes", ERROR_PREFIX, limit);
                    self.write_line(&notice).await.map_err(SessionError::Write)?;
                    return Ok(SessionEnd::LineTooLong);
                }
                Err(LineError::Io(e)) => return Err(SessionError::Read(e)),
            };

            match Request::parse(&line) {
                Request::Empty => continue,
                Request::Control(control) => {
                    debug!(token = control.token(), "client ended the session");
                    return Ok(SessionEnd::Control(control));
                }
                Request::Command(cmd) => {
                    if let Some(reply) = self.shell.execute(&cmd).await {
                        self.write_chunk(&reply).await.map_err(SessionError::Write)?;
                    }
                }
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(LINE_TERMINATOR.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn write_chunk(&mut self, chunk: &str) -> io::Result<()> {
        self.writer.write_all(chunk.as_bytes()).await?;
        self.writer.flush().await
    }
}
