//! Server configuration.
//!
//! Values come from three layers, later ones winning: built-in defaults
//! (the Puma TCP-mode setup this server grew out of: `127.0.0.1:9292`, at
//! most 10 concurrent sessions), an optional TOML file, and command-line
//! flags (see [`Cli`]).

mod cli;

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, bail};
use serde::{Deserialize, Serialize};

use crate::security::{Allowlist, CommandPolicy, TrustedRemoteExec};
use crate::shell::ExecutorConfig;

pub use cli::Cli;

pub const DEFAULT_BIND: &str = "127.0.0.1:9292";
pub const DEFAULT_MAX_SESSIONS: usize = 10;
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Any command, any shell syntax.
    #[default]
    Trusted,
    /// Only first words listed in `allow`.
    Allowlist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub mode: PolicyMode,
    pub allow: Vec<String>,
    pub deny_shell_operators: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: PolicyMode::Trusted,
            allow: Vec::new(),
            deny_shell_operators: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub max_sessions: usize,
    pub max_line_bytes: usize,
    pub max_output_bytes: usize,
    /// `0` disables the execution deadline.
    pub exec_timeout_secs: u64,
    pub shell: String,
    /// Required to serve trusted mode on anything but loopback.
    pub trusted_remote_exec: bool,
    pub policy: PolicyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 9292)),
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            exec_timeout_secs: DEFAULT_EXEC_TIMEOUT_SECS,
            shell: DEFAULT_SHELL.to_string(),
            trusted_remote_exec: false,
            policy: PolicyConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config at {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let cfg: ServerConfig = toml::from_str(raw)?;
        Ok(cfg)
    }

    /// Defaults, then the file named by `--config`, then the other flags.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut cfg = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        cli.apply(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that cannot work or that would expose the
    /// remote shell to the network without an explicit opt-in.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_sessions == 0 {
            bail!("max_sessions must be at least 1");
        }
        if self.max_line_bytes == 0 {
            bail!("max_line_bytes must be at least 1");
        }
        if self.shell.trim().is_empty() {
            bail!("shell must not be empty");
        }
        if self.policy.mode == PolicyMode::Allowlist && self.policy.allow.is_empty() {
            bail!("policy mode 'allowlist' needs at least one entry in policy.allow");
        }
        if self.policy.mode == PolicyMode::Trusted
            && !self.bind.ip().is_loopback()
            && !self.trusted_remote_exec
        {
            bail!(
                "refusing to serve an unrestricted shell on {}: set trusted_remote_exec = true \
                 (or pass --trusted-remote-exec) to allow it, or use policy mode 'allowlist'",
                self.bind
            );
        }
        Ok(())
    }

    pub fn exec_timeout(&self) -> Option<Duration> {
        match self.exec_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            shell: self.shell.clone(),
            timeout: self.exec_timeout(),
            max_output_bytes: self.max_output_bytes,
        }
    }

    pub fn build_policy(&self) -> Arc<dyn CommandPolicy> {
        match self.policy.mode {
            PolicyMode::Trusted => Arc::new(TrustedRemoteExec),
            PolicyMode::Allowlist => Arc::new(
                Allowlist::from_commands(self.policy.allow.iter().cloned())
                    .with_shell_operators(!self.policy.deny_shell_operators),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_puma_setup() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind.to_string(), DEFAULT_BIND);
        assert_eq!(cfg.max_sessions, 10);
        assert_eq!(cfg.policy.mode, PolicyMode::Trusted);
        assert_eq!(cfg.exec_timeout(), Some(Duration::from_secs(30)));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = ServerConfig::from_toml("max_sessions = 3\nexec_timeout_secs = 0\n").unwrap();
        assert_eq!(cfg.max_sessions, 3);
        assert_eq!(cfg.exec_timeout(), None);
        assert_eq!(cfg.bind.to_string(), DEFAULT_BIND);
        assert_eq!(cfg.shell, DEFAULT_SHELL);
    }

    #[test]
    fn test_policy_section() {
        let cfg = ServerConfig::from_toml(
            r#"
            [policy]
            mode = "allowlist"
            allow = ["ls", "echo"]
            deny_shell_operators = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.policy.mode, PolicyMode::Allowlist);
        let policy = cfg.build_policy();
        assert_eq!(policy.name(), "allowlist");
        assert!(policy.evaluate("echo hi | wc").is_allowed());
        assert!(!policy.evaluate("rm x").is_allowed());
    }

    #[test]
    fn test_bad_values_fail() {
        assert!(ServerConfig::from_toml("bind = \"not an address\"").is_err());
        assert!(ServerConfig::from_toml("[policy]\nmode = \"yolo\"").is_err());
    }

    #[test]
    fn test_trusted_on_public_address_requires_opt_in() {
        let mut cfg = ServerConfig::from_toml("bind = \"0.0.0.0:9292\"").unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("trusted_remote_exec"));

        cfg.trusted_remote_exec = true;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_allowlist_on_public_address_needs_no_opt_in() {
        let cfg = ServerConfig::from_toml(
            "bind = \"0.0.0.0:9292\"\n[policy]\nmode = \"allowlist\"\nallow = [\"uptime\"]\n",
        )
        .unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_allowlist_rejected() {
        let cfg = ServerConfig::from_toml("[policy]\nmode = \"allowlist\"\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_sessions_rejected() {
        let cfg = ServerConfig::from_toml("max_sessions = 0").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"127.0.0.1:7000\"\nshell = \"/bin/bash\"").unwrap();
        let cfg = ServerConfig::load(file.path()).unwrap();
        assert_eq!(cfg.bind.port(), 7000);
        assert_eq!(cfg.executor_config().shell, "/bin/bash");
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = ServerConfig::load(Path::new("/nonexistent/puma-shell.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
