//! Session management CLI operations for kiri.
//!
//! Handles listing, showing, and deleting sessions through the
//! `kiri session` subcommand family. Provides table-formatted output
//! and partial session ID matching (git-style short IDs).

use anyhow::Result;
use colored::Colorize;

use super::SessionAction;
use crate::format;
use crate::history::MessageHistory;
use crate::session::Session;
use crate::storage::Storage;

/// Dispatches a session subcommand to its handler.
pub(crate) fn handle_session(action: SessionAction) -> Result<()> {
    let history = MessageHistory::new(Storage::open_default()?);
    match action {
        SessionAction::List => session_list(&history),
        SessionAction::Show { id } => {
            let full_id = Session::resolve_prefix(history.storage(), &id)?;
            session_show(&history, &full_id)
        }
        SessionAction::Delete { id } => {
            let full_id = Session::resolve_prefix(history.storage(), &id)?;
            session_delete(&history, &full_id)
        }
    }
}

/// Lists all saved sessions in a formatted table.
///
/// Displays session ID, title, message count, last-updated timestamp,
/// and directory. Adapts column widths to the terminal size.
fn session_list(history: &MessageHistory) -> Result<()> {
    let sessions = Session::list_all(history.storage())?;
    if sessions.is_empty() {
        println!("{}", "No sessions found.".dimmed());
        println!("Start one with: {}", "kiri chat".cyan());
        return Ok(());
    }

    let term_width = terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80);

    // ID=10, MSGS=6, UPDATED=18, DIRECTORY~20
    let fixed_cols = 10 + 6 + 18 + 20;
    let max_title_len = sessions
        .iter()
        .map(|s| s.title.as_deref().unwrap_or("(untitled)").chars().count())
        .max()
        .unwrap_or(5);

    let max_from_terminal = term_width.saturating_sub(fixed_cols).min(50);
    let title_width = max_title_len.max(5).min(max_from_terminal.max(5));
    let header_width = 10 + title_width + 2 + 6 + 18 + 20;

    println!(
        "{} {} {} {} {}",
        format!("{:<10}", "ID").bold(),
        format!("{:<tw$}", "TITLE", tw = title_width + 2).bold(),
        format!("{:<6}", "MSGS").bold(),
        format!("{:<18}", "UPDATED").bold(),
        "DIRECTORY".bold(),
    );
    println!("{}", "-".repeat(term_width.min(header_width)));

    for s in &sessions {
        let title_str = s.title.as_deref().unwrap_or("(untitled)");
        let title = if title_str.chars().count() > title_width {
            let truncated: String = title_str.chars().take(title_width - 3).collect();
            format!("{}...", truncated)
        } else {
            title_str.to_string()
        };

        // RFC3339 -> "YYYY-MM-DD HH:MM"
        let updated = chrono::DateTime::parse_from_rfc3339(&s.updated_at)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| s.updated_at.chars().take(16).collect());
        let count = history.count(&s.id).unwrap_or(0);

        // Pad first, then colorize to avoid ANSI escape code width issues
        let id_col = format!("{:<10}", s.short_id());
        let title_col = format!("{:<tw$}", title, tw = title_width + 2);
        let msgs_col = format!("{:<6}", count);
        let updated_col = format!("{:<18}", updated);

        println!(
            "{} {} {} {} {}",
            id_col.cyan(),
            title_col,
            msgs_col.yellow(),
            updated_col.dimmed(),
            s.directory.dimmed(),
        );
    }
    println!();
    println!(
        "{} {} sessions. Continue one with: {}",
        "total:".dimmed(),
        sessions.len(),
        "kiri chat --session <id>".cyan()
    );
    Ok(())
}

/// Prints every stored message of a session.
fn session_show(history: &MessageHistory, id: &str) -> Result<()> {
    let session = Session::load(history.storage(), id)?;
    println!(
        "{} [session: {}] {}",
        session.title.as_deref().unwrap_or("(untitled)").bold(),
        session.short_id().yellow(),
        session.directory.dimmed()
    );
    println!();
    let messages = history.load(id, usize::MAX)?;
    if messages.is_empty() {
        println!("{}", "No messages.".dimmed());
    }
    for msg in &messages {
        println!("{}", format::format_message(msg));
        println!();
    }
    Ok(())
}

/// Deletes a session by its full ID, messages included.
fn session_delete(history: &MessageHistory, id: &str) -> Result<()> {
    let session = Session::load(history.storage(), id)?;
    let title = session.title.as_deref().unwrap_or("(untitled)");
    println!("Deleting session {} (\"{}\")", session.short_id().cyan(), title);
    Session::delete(history.storage(), id)?;
    println!("{}", "Deleted.".green());
    Ok(())
}
