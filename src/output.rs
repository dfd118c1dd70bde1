//! Output rendering abstraction for kiri.
//!
//! The runner emits [`OutputChunk`]s and never prints. A [`Renderer`] decides
//! how chunks reach the user; [`StdoutRenderer`] streams model text to stdout
//! and prints tool summaries and notices around it.

use colored::Colorize;
use std::io::{self, Write};

use crate::constants::TOOL_PREVIEW_CHARS;

/// One displayable piece of a run, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputChunk {
    /// Streamed model text.
    Text(String),
    /// A tool call is about to run.
    ToolStarted { name: String, args: String },
    /// A tool call finished; `preview` is the head of its output or error.
    ToolFinished {
        name: String,
        title: String,
        is_error: bool,
        preview: String,
    },
    /// Doom loop, iteration limit, cancellation, or a persistence warning.
    Notice(String),
    /// Terminal failure of the run.
    Error(String),
}

impl OutputChunk {
    /// Builds a [`OutputChunk::ToolFinished`] with the first line-ish
    /// `TOOL_PREVIEW_CHARS` characters of `text`.
    pub fn tool_finished(name: &str, title: &str, is_error: bool, text: &str) -> Self {
        OutputChunk::ToolFinished {
            name: name.to_string(),
            title: title.to_string(),
            is_error,
            preview: preview(text),
        }
    }
}

fn preview(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= TOOL_PREVIEW_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(TOOL_PREVIEW_CHARS).collect();
    format!("{}...", head)
}

/// Receives the chunks of a run.
pub trait Renderer {
    fn render(&mut self, chunk: &OutputChunk);
}

/// Renders chunks directly to the terminal.
///
/// Model text streams to stdout with an explicit flush per chunk; tool lines
/// and notices are dimmed or colored and always start on a fresh line.
#[derive(Default)]
pub struct StdoutRenderer {
    /// True when the cursor sits after streamed text with no trailing newline.
    mid_line: bool,
    text_chunks: usize,
}

impl StdoutRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of text chunks streamed so far.
    pub fn text_chunks(&self) -> usize {
        self.text_chunks
    }

    fn break_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }
}

impl Renderer for StdoutRenderer {
    fn render(&mut self, chunk: &OutputChunk) {
        match chunk {
            OutputChunk::Text(text) => {
                print!("{}", text);
                // Flush immediately so each chunk appears as it arrives
                io::stdout().flush().ok();
                self.mid_line = !text.ends_with('\n');
                self.text_chunks += 1;
            }
            OutputChunk::ToolStarted { name, args } => {
                self.break_line();
                println!("{} {} {}", "→".cyan(), name.bold(), args.dimmed());
            }
            OutputChunk::ToolFinished {
                title,
                is_error,
                preview,
                ..
            } => {
                let marker = if *is_error { "✗".red() } else { "✓".green() };
                println!("  {} {}", marker, title.dimmed());
                for line in preview.lines().take(5) {
                    println!("    {}", line.dimmed());
                }
            }
            OutputChunk::Notice(text) => {
                self.break_line();
                println!("{} {}", "notice:".yellow().bold(), text);
            }
            OutputChunk::Error(text) => {
                self.break_line();
                eprintln!("{} {}", "error:".red().bold(), text);
            }
        }
    }
}

/// Keeps every chunk in memory.
#[cfg(test)]
#[derive(Default)]
pub struct ChunkCollector {
    pub chunks: Vec<OutputChunk>,
}

#[cfg(test)]
impl Renderer for ChunkCollector {
    fn render(&mut self, chunk: &OutputChunk) {
        self.chunks.push(chunk.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates() {
        let chunk = OutputChunk::tool_finished("bash", "ls", false, &"x".repeat(500));
        match chunk {
            OutputChunk::ToolFinished { preview, .. } => {
                assert_eq!(preview.chars().count(), TOOL_PREVIEW_CHARS + 3);
                assert!(preview.ends_with("..."));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stdout_renderer_tracks_line_state() {
        let mut renderer = StdoutRenderer::new();
        renderer.render(&OutputChunk::Text("partial".into()));
        assert!(renderer.mid_line);
        renderer.render(&OutputChunk::Notice("stop".into()));
        assert!(!renderer.mid_line);
        assert_eq!(renderer.text_chunks(), 1);
    }
}
