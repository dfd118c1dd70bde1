//! Entry point for kiri, a bounded tool-calling AI coding agent for the terminal.
//!
//! This binary loads environment variables, sets up logging, parses CLI
//! arguments via [`cli`], and dispatches to the appropriate subcommand handler.

mod agent;
mod chat;
mod cli;
mod config;
mod constants;
mod context;
mod diff;
mod doom_loop;
mod error;
mod format;
mod history;
mod message;
mod output;
mod permissions;
mod provider;
mod runner;
mod session;
mod storage;
mod tokens;
mod tools;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Runs the kiri CLI.
///
/// Loads `.env` files (silently ignored if absent), installs a stderr log
/// subscriber so stdout carries only model output, and dispatches the chosen
/// subcommand via [`cli::run`].
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = cli::parse();

    let default_filter = if cli.verbose { "kiri=debug" } else { "kiri=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    cli::run(cli).await
}
