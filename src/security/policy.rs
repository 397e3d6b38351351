//! Command policy hook.
//!
//! Every command a client sends goes through a [`CommandPolicy`] before it
//! reaches the shell. The session loop only sees the [`Verdict`].

use std::fmt;

/// Verdict for command evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny { reason: String },
}

impl Verdict {
    pub fn deny(reason: impl Into<String>) -> Self {
        Verdict::Deny {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// Decides whether a command line may be executed.
///
/// Implementations must be cheap and side-effect free; they are called once
/// per request from many sessions at the same time.
pub trait CommandPolicy: Send + Sync + fmt::Debug {
    fn evaluate(&self, cmd: &str) -> Verdict;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Trusted remote exec: every command runs, shell syntax included.
///
/// Anyone who can reach the socket gets arbitrary command execution on the
/// host with the server's privileges. The server only binds this mode to a
/// non-loopback address when explicitly told to.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustedRemoteExec;

impl CommandPolicy for TrustedRemoteExec {
    fn evaluate(&self, _cmd: &str) -> Verdict {
        Verdict::Allow
    }

    fn name(&self) -> &'static str {
        "trusted"
    }
}
