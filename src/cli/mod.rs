//! Command-line interface definition and dispatch for kiri.
//!
//! Uses [`clap`] for argument parsing with derive macros. Each subcommand is
//! routed to its handler: session operations live in [`session`], the shared
//! run setup in [`workbench`].

mod session;
mod workbench;

pub(crate) use workbench::Workbench;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use crate::{chat, config, runner::StopReason};

/// Top-level CLI structure for kiri.
#[derive(Parser)]
#[command(
    name = "kiri",
    version,
    about = "A bounded, tool-calling AI coding agent"
)]
pub struct Cli {
    /// Debug logging on stderr (same as RUST_LOG=kiri=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by `run` and `chat`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunOptions {
    /// Agent to run (build, plan, or one from config)
    #[arg(short, long)]
    pub agent: Option<String>,
    /// Continue a session (supports partial IDs)
    #[arg(short, long)]
    pub session: Option<String>,
    /// Provider to use (anthropic, openai, openrouter, ollama)
    #[arg(long)]
    pub provider: Option<String>,
    /// Model to use (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,
    /// Upper bound on model calls for each request
    #[arg(long)]
    pub max_iterations: Option<usize>,
    /// Approve every tool call that would ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Available subcommands for the kiri CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Run one request through the agent loop
    Run {
        #[command(flatten)]
        options: RunOptions,
        /// The request
        message: Vec<String>,
    },
    /// Start an interactive chat session
    Chat {
        #[command(flatten)]
        options: RunOptions,
    },
    /// Manage sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// List configured agents and their policies
    Agents,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Subcommands for the `config` command.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the merged configuration (API keys masked)
    Show,
}

/// Subcommands for the `session` command.
#[derive(Subcommand)]
pub enum SessionAction {
    /// List all sessions
    List,
    /// Print a session's messages (supports partial IDs)
    Show { id: String },
    /// Delete a session and its messages (supports partial IDs)
    Delete { id: String },
}

/// Parses command-line arguments into a [`Cli`] struct.
///
/// Delegates to [`clap::Parser::parse`], which exits the process on invalid input.
pub fn parse() -> Cli {
    Cli::parse()
}

/// Dispatches the parsed CLI command to its handler.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { options, message } => {
            let message = message.join(" ");
            if message.trim().is_empty() {
                anyhow::bail!("No request provided. Usage: kiri run \"your request here\"");
            }

            let mut bench = Workbench::prepare(&options)?;
            bench.print_banner();
            println!("{} {}", ">".green().bold(), message);
            println!();

            let outcome = bench.run(&message).await?;
            println!();
            bench.print_footer(&outcome);
            match outcome.stop {
                StopReason::Completed | StopReason::Cancelled => Ok(()),
                StopReason::DoomLoop(kind) => anyhow::bail!("Run halted: doom loop ({})", kind),
                StopReason::IterationLimit(n) => {
                    anyhow::bail!("Run halted: iteration limit of {} reached", n)
                }
            }
        }
        Commands::Chat { options } => {
            let bench = Workbench::prepare(&options)?;
            chat::run_chat(bench).await
        }
        Commands::Session { action } => session::handle_session(action),
        Commands::Agents => list_agents(),
        Commands::Config { action } => match action {
            ConfigAction::Show => show_config(),
        },
    }
}

fn list_agents() -> Result<()> {
    let config = config::Config::load()?;
    let default = config.default_agent_name();
    for name in config.agent_names() {
        let agent = config.agent(&name)?;
        let marker = if name == default { "*".green().bold() } else { " ".normal() };
        println!("{} {} {}", marker, agent.name.bold().cyan(), agent.description.dimmed());

        let disabled: Vec<&str> = agent
            .tools
            .iter()
            .filter(|(_, enabled)| !**enabled)
            .map(|(tool, _)| tool.as_str())
            .collect();
        if !disabled.is_empty() {
            println!("    disabled tools: {}", disabled.join(", "));
        }
        println!(
            "    edit: {}  webfetch: {}  max iterations: {}",
            agent.edit, agent.webfetch, agent.max_iterations
        );
        for rule in &agent.bash {
            println!("    bash {:<16} {}", rule.pattern, rule.permission);
        }
        println!();
    }
    Ok(())
}

fn show_config() -> Result<()> {
    let mut config = config::Config::load()?;
    for entry in [
        &mut config.provider.anthropic,
        &mut config.provider.openai,
        &mut config.provider.openrouter,
        &mut config.provider.ollama,
    ]
    .into_iter()
    .flatten()
    {
        if entry.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            entry.api_key = Some("********".into());
        }
    }

    let path = config::Config::config_path()?;
    println!("{} {}", "Config path:".bold(), path.display());
    println!();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
