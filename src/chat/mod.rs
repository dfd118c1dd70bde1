//! Interactive chat REPL for kiri.
//!
//! Each line the user enters is one agent run on the same session, so the
//! runner sees everything said before through the persisted history.

mod commands;

use anyhow::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::cli::Workbench;
use crate::config::Config;
use crate::format;
use crate::runner::StopReason;

/// Runs the interactive chat REPL.
///
/// # Readline behavior
///
/// - **Ctrl+C** at the prompt: cancels current input, stays in REPL
/// - **Ctrl+C** during a run: cancels the run
/// - **Ctrl+D**: exits cleanly with "goodbye."
/// - Readline history is persisted to `~/.cache/kiri/chat_history.txt`
pub async fn run_chat(mut bench: Workbench) -> Result<()> {
    if bench.resumed {
        println!(
            "{} [session: {}] [agent: {}]",
            "resuming".bold().cyan(),
            bench.session.short_id().yellow(),
            bench.agent.name.yellow(),
        );
        println!();
        for msg in bench
            .history
            .load(&bench.session.id, bench.settings.max_conversation_messages)?
        {
            println!("{}", format::format_message(&msg));
            println!();
        }
    } else {
        bench.print_banner();
        println!("{}", "Ctrl+D to exit, /help for commands".dimmed());
        println!();
    }

    let mut rl = DefaultEditor::new()?;
    let history_path = Config::cache_dir()?.join(crate::constants::HISTORY_FILENAME);
    if history_path.exists() {
        let _ = rl.load_history(&history_path);
    }

    loop {
        let readline = rl.readline(&format!("{} ", ">".green().bold()));

        match readline {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }

                if line.starts_with('/') {
                    match commands::handle_slash_command(&line, &bench)? {
                        commands::CommandAction::Continue => continue,
                        commands::CommandAction::Unknown(cmd) => {
                            println!("{} Unknown command: {}", "?".yellow(), cmd);
                            continue;
                        }
                    }
                }

                let _ = rl.add_history_entry(&line);
                println!();

                match bench.run(&line).await {
                    Ok(outcome) => {
                        if !matches!(outcome.stop, StopReason::Completed) {
                            bench.print_footer(&outcome);
                        }
                    }
                    // The user message is already persisted; the next line
                    // continues the same session.
                    Err(e) => eprintln!("{} {:#}", "error:".red().bold(), e),
                }
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".dimmed());
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "goodbye.".dimmed());
                break;
            }
            Err(e) => {
                eprintln!("{} {}", "error:".red().bold(), e);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = rl.save_history(&history_path);

    Ok(())
}
