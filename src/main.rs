//! Main entry point for Puma Shell.
//!
//! Parses flags, loads the config, initializes logging and serves until
//! Ctrl-C.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use puma_shell::config::{Cli, ServerConfig};
use puma_shell::server::Server;
use puma_shell::utils;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging before anything else; the guard flushes file logs on exit
    let _log_guard = utils::logger::init_logging(cli.log_dir.as_deref())?;

    let cfg = ServerConfig::resolve(&cli)?;

    let server = Server::bind(&cfg).await?;
    server
        .run(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl-C, shutting down"),
                Err(e) => error!("failed to listen for Ctrl-C: {}", e),
            }
        })
        .await
}
