//! Security module for deciding which client commands may run.
//!
//! The base protocol is a remote shell: whatever the client sends is run by
//! the host shell. That capability is modelled as the [`TrustedRemoteExec`]
//! policy; [`Allowlist`] is the restricted alternative. Other policies
//! (authentication-aware, audit) plug in through [`CommandPolicy`].

mod allowlist;
mod policy;

pub use allowlist::{Allowlist, contains_shell_composition};
pub use policy::{CommandPolicy, TrustedRemoteExec, Verdict};
