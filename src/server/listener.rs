//! TCP accept loop.
//!
//! Every accepted connection gets its own tokio task running
//! [`CommandShellServer::serve`]. Sessions share nothing but the admission
//! semaphore, so one session failing or hanging never touches another.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::CommandShellServer;
use crate::config::ServerConfig;
use crate::shell::ShellExecutor;

// Back-off after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    shell: Arc<CommandShellServer>,
    limiter: Arc<Semaphore>,
    max_sessions: usize,
    next_session_id: u64,
}

impl Server {
    /// Bind the configured address and build the shell from the config.
    pub async fn bind(cfg: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(cfg.bind)
            .await
            .with_context(|| format!("Failed to bind {}", cfg.bind))?;
        let shell = CommandShellServer::new(
            ShellExecutor::new(cfg.executor_config()),
            cfg.build_policy(),
            cfg.max_line_bytes,
        );
        Ok(Self::from_listener(listener, shell, cfg.max_sessions))
    }

    pub fn from_listener(
        listener: TcpListener,
        shell: CommandShellServer,
        max_sessions: usize,
    ) -> Self {
        let max_sessions = max_sessions.max(1);
        Self {
            listener,
            shell: Arc::new(shell),
            limiter: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
            next_session_id: 0,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// When all session slots are taken, new connections wait in the kernel
    /// backlog until a session ends. Sessions still running at shutdown are
    /// left to finish on their own tasks.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            addr = %self.local_addr()?,
            policy = self.shell.policy().name(),
            max_sessions = self.max_sessions,
            "listening"
        );
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.limiter.clone().acquire_owned() => {
                    permit.context("session limiter closed")?
                }
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, "could not set TCP_NODELAY: {}", e);
            }

            self.next_session_id += 1;
            let span = info_span!("session", id = self.next_session_id, %peer);
            let shell = Arc::clone(&self.shell);

            tokio::spawn(
                async move {
                    info!("session started");
                    let end = shell.serve(stream).await;
                    info!(?end, "session ended");
                    drop(permit);
                }
                .instrument(span),
            );
        }

        let active = self.max_sessions - self.limiter.available_permits();
        if active > 0 {
            warn!(active, "listener stopped with sessions still running");
        } else {
            info!("listener stopped");
        }
        Ok(())
    }
}
