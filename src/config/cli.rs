use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use super::ServerConfig;

/// Line-oriented remote shell over TCP.
///
/// Every line a client sends is run by the host shell and the combined
/// output is sent back. Anyone who can connect can run commands as the
/// user this server runs as.
#[derive(Debug, Default, Parser)]
#[command(name = "puma-shell", version)]
pub struct Cli {
    /// TOML config file. Flags override values from it.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on (default 127.0.0.1:9292).
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Maximum number of concurrent sessions.
    #[arg(long, value_name = "N")]
    pub max_sessions: Option<usize>,

    /// Per-command deadline in seconds, 0 to disable.
    #[arg(long, value_name = "SECS")]
    pub exec_timeout: Option<u64>,

    /// Shell used to run commands.
    #[arg(long, value_name = "PATH")]
    pub shell: Option<String>,

    /// Allow unrestricted command execution on a non-loopback address.
    #[arg(long)]
    pub trusted_remote_exec: bool,

    /// Write logs to a timestamped file in this directory instead of stderr.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    pub fn apply(&self, cfg: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            cfg.bind = bind;
        }
        if let Some(n) = self.max_sessions {
            cfg.max_sessions = n;
        }
        if let Some(secs) = self.exec_timeout {
            cfg.exec_timeout_secs = secs;
        }
        if let Some(shell) = &self.shell {
            cfg.shell = shell.clone();
        }
        // A flag can only opt in, never revoke what the file set.
        if self.trusted_remote_exec {
            cfg.trusted_remote_exec = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_no_flags_keeps_config() {
        let cli = Cli::try_parse_from(["puma-shell"]).unwrap();
        let mut cfg = ServerConfig::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "puma-shell",
            "--bind",
            "0.0.0.0:4000",
            "--max-sessions",
            "2",
            "--exec-timeout",
            "5",
            "--trusted-remote-exec",
        ])
        .unwrap();
        let mut cfg = ServerConfig::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.bind.port(), 4000);
        assert_eq!(cfg.max_sessions, 2);
        assert_eq!(cfg.exec_timeout(), Some(Duration::from_secs(5)));
        assert!(cfg.trusted_remote_exec);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_public_bind_without_opt_in_is_refused() {
        let cli = Cli::try_parse_from(["puma-shell", "--bind", "0.0.0.0:4000"]).unwrap();
        assert!(ServerConfig::resolve(&cli).is_err());
    }

    #[test]
    fn test_bad_address_is_a_parse_error() {
        assert!(Cli::try_parse_from(["puma-shell", "--bind", "nowhere"]).is_err());
    }
}
