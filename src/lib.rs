//! Puma Shell - a line-oriented remote shell over TCP
//!
//! A client connects, gets a greeting and a `> ` prompt, and every line it
//! sends is run by the host shell; the combined stdout/stderr comes back as
//! the reply. `exit` or `quit` ends the session with `Bye!`.
//!
//! This library provides:
//! - The wire protocol constants and request classification
//! - The session loop, usable on any async byte stream
//! - A TCP listener serving one task per connection
//! - Bounded shell execution (deadline, output cap)
//! - Command policies: unrestricted "trusted remote exec" or an allowlist
//!
//! # Example
//!
//! ```no_run
//! use puma_shell::config::ServerConfig;
//! use puma_shell::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = ServerConfig::default(); // 127.0.0.1:9292, trusted mode
//!     let server = Server::bind(&cfg).await?;
//!     server
//!         .run(async {
//!             tokio::signal::ctrl_c().await.ok();
//!         })
//!         .await
//! }
//! ```

pub mod config;
pub mod protocol;
pub mod security;
pub mod server;
pub mod shell;
pub mod utils;

// Re-export commonly used types
pub use config::ServerConfig;
pub use server::{CommandShellServer, Server, SessionEnd};
pub use shell::ShellExecutor;
