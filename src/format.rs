//! Terminal formatting of stored messages (`kiri session show`, `/history`).

use colored::Colorize;

use crate::message::{Message, Part, Role, ToolStatus};

/// Format a message for terminal display with role label and colors.
pub fn format_message(msg: &Message) -> String {
    let label = match msg.role {
        Role::User => "you:".green().bold().to_string(),
        Role::Assistant => match &msg.agent {
            Some(agent) => format!("{} {}", "kiri:".cyan().bold(), format!("({})", agent).dimmed()),
            None => "kiri:".cyan().bold().to_string(),
        },
    };

    let mut body = Vec::new();
    for part in &msg.parts {
        match part {
            Part::Text { text } if msg.role == Role::User => body.push(text.clone()),
            Part::Text { text } => body.push(render_markdown_lite(text)),
            Part::ToolCall(call) => {
                let status = match call.status {
                    ToolStatus::Pending => "pending".yellow(),
                    ToolStatus::Completed => "done".green(),
                    ToolStatus::Error => "error".red(),
                    ToolStatus::Denied => "denied".red(),
                };
                body.push(format!(
                    "{} {} {} [{}]",
                    "→".cyan(),
                    call.name.bold(),
                    call.args.to_string().dimmed(),
                    status
                ));
            }
            Part::ToolResult(result) => match &result.error {
                Some(err) => body.push(format!("  {} {}", "✗".red(), first_line(err).dimmed())),
                None => body.push(format!("  {} {}", "✓".green(), result.title.dimmed())),
            },
        }
    }
    format!("{}\n{}", label, body.join("\n"))
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Minimal markdown renderer for terminal output.
/// Not a full parser. Handles the three most common patterns
/// in LLM output: bold, inline code, and fenced code blocks.
pub fn render_markdown_lite(text: &str) -> String {
    let mut output = String::new();
    let mut in_code_block = false;

    for line in text.lines() {
        if let Some(lang) = line.strip_prefix("```") {
            if in_code_block {
                in_code_block = false;
                output.push('\n');
            } else {
                in_code_block = true;
                let lang = lang.trim_start_matches('`');
                if !lang.is_empty() {
                    output.push_str(&format!("  {}\n", lang.dimmed()));
                }
            }
            continue;
        }

        if in_code_block {
            output.push_str(&format!("  {}\n", line.dimmed()));
            continue;
        }

        output.push_str(&render_inline(line));
        output.push('\n');
    }

    if output.ends_with('\n') {
        output.pop();
    }
    output
}

/// Handle **bold** and `inline code` within a single line.
fn render_inline(line: &str) -> String {
    let mut result = String::new();
    let chars: Vec<char> = line.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        if i + 1 < len && chars[i] == '*' && chars[i + 1] == '*' {
            if let Some(end) = find_closing(&chars, i + 2, &['*', '*']) {
                let bold_text: String = chars[i + 2..end].iter().collect();
                result.push_str(&bold_text.bold().to_string());
                i = end + 2;
                continue;
            }
        }

        if chars[i] == '`' {
            if let Some(end) = find_closing(&chars, i + 1, &['`']) {
                let code_text: String = chars[i + 1..end].iter().collect();
                result.push_str(&code_text.dimmed().to_string());
                i = end + 1;
                continue;
            }
        }

        result.push(chars[i]);
        i += 1;
    }

    result
}

fn find_closing(chars: &[char], start: usize, pattern: &[char]) -> Option<usize> {
    chars
        .get(start..)?
        .windows(pattern.len())
        .position(|w| w == pattern)
        .map(|offset| start + offset)
}
