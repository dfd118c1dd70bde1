//! Slash command handlers for the chat REPL.
//!
//! Dispatches `/history`, `/clear` and `/help`. Returns a [`CommandAction`]
//! so the REPL loop can decide how to proceed.

use anyhow::Result;
use colored::Colorize;

use crate::cli::Workbench;
use crate::format;

/// Action returned by slash command handling.
#[derive(Debug, PartialEq)]
pub(crate) enum CommandAction {
    /// Command was handled; continue the REPL loop.
    Continue,
    /// Unknown command was entered.
    Unknown(String),
}

pub(crate) fn handle_slash_command(command: &str, bench: &Workbench) -> Result<CommandAction> {
    match command {
        "/history" => {
            let messages = bench.history.load(&bench.session.id, usize::MAX)?;
            if messages.is_empty() {
                println!("{}", "No messages yet.".dimmed());
            }
            for msg in &messages {
                println!("{}", format::format_message(msg));
                println!();
            }
            Ok(CommandAction::Continue)
        }
        "/clear" => {
            bench.history.clear(&bench.session.id)?;
            println!("{}", "History cleared.".dimmed());
            Ok(CommandAction::Continue)
        }
        "/help" => {
            println!("{}", "Commands:".bold());
            println!("  {} - show conversation history", "/history".cyan());
            println!("  {} - clear conversation", "/clear".cyan());
            println!("  {} - show this help", "/help".cyan());
            println!("  {} - cancel a running request", "Ctrl+C".cyan());
            println!("  {} - exit", "Ctrl+D".cyan());
            Ok(CommandAction::Continue)
        }
        _ => Ok(CommandAction::Unknown(command.to_string())),
    }
}
