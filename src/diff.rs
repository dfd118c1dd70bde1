//! Diff generation for file changes.
//!
//! [`unified`] produces the plain diff the edit tool returns to the model;
//! [`colorize`] dresses a diff up for the terminal permission prompt.

use colored::Colorize;
use similar::{ChangeTag, TextDiff};

/// Generate a plain unified diff string with three lines of context.
///
/// Returns only the header if the contents are identical.
pub fn unified(old: &str, new: &str, path: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    output.push_str(&format!("--- a/{}\n", path));
    output.push_str(&format!("+++ b/{}\n", path));

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        output.push_str(&format!("{}", hunk.header()));
        output.push('\n');

        for change in hunk.iter_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => ' ',
            };
            output.push(sign);
            output.push_str(change.value());
            if change.missing_newline() {
                output.push('\n');
            }
        }
    }

    output
}

/// Diff for a file that does not exist yet (all lines are additions).
pub fn new_file_preview(content: &str, path: &str) -> String {
    let mut output = String::new();
    output.push_str("--- /dev/null\n");
    output.push_str(&format!("+++ b/{}\n", path));

    for line in content.lines() {
        output.push_str(&format!("+{}\n", line));
    }

    output
}

/// Colors additions green and deletions red, leaving headers alone.
pub fn colorize(diff: &str) -> String {
    let mut output = String::new();
    for line in diff.lines() {
        let styled = if line.starts_with("+++") || line.starts_with("---") {
            line.bold().to_string()
        } else if line.starts_with('+') {
            line.green().to_string()
        } else if line.starts_with('-') {
            line.red().to_string()
        } else if line.starts_with("@@") {
            line.cyan().to_string()
        } else {
            line.to_string()
        };
        output.push_str(&styled);
        output.push('\n');
    }
    output
}
