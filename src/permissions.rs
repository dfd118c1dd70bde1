//! Permission levels and the confirmation boundary.
//!
//! Agent policies resolve every tool call to a [`Permission`]. When the
//! answer is [`Permission::Ask`], the runner hands a [`PermissionRequest`]
//! to an injected [`PermissionPrompter`] and acts on the [`Decision`].

use anyhow::Result;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::diff;
use crate::tools;
use crate::tools::edit_tool::EditInput;

/// Permission level for a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Allow,
    Ask,
    Deny,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Allow => write!(f, "allow"),
            Permission::Ask => write!(f, "ask"),
            Permission::Deny => write!(f, "deny"),
        }
    }
}

/// Answer to a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ApproveOnce,
    ApproveAlways,
    DenyOnce,
    DenyAlways,
}

impl Decision {
    pub fn approved(self) -> bool {
        matches!(self, Decision::ApproveOnce | Decision::ApproveAlways)
    }
}

/// What the runner asks the user about.
#[derive(Debug, Clone, Copy)]
pub struct PermissionRequest<'a> {
    pub tool: &'a str,
    pub args: &'a Value,
    pub agent: &'a str,
    pub working_dir: &'a Path,
}

/// Confirms or rejects tool calls whose policy is "ask".
///
/// Implementations own any memory of "always" answers.
pub trait PermissionPrompter: Send + Sync {
    fn confirm(&self, request: &PermissionRequest<'_>) -> Result<Decision>;
}

/// Approves everything (`--yes`, `auto_approve = true`).
pub struct AutoApprove;

impl PermissionPrompter for AutoApprove {
    fn confirm(&self, _request: &PermissionRequest<'_>) -> Result<Decision> {
        Ok(Decision::ApproveOnce)
    }
}

/// Asks on the terminal and remembers "always" answers per tool for the
/// lifetime of the process.
#[derive(Default)]
pub struct TerminalPrompter {
    remembered: Mutex<HashMap<String, Decision>>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    fn remembered(&self, tool: &str) -> Option<Decision> {
        let map = self
            .remembered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.get(tool).copied()
    }

    fn remember(&self, tool: &str, decision: Decision) {
        let mut map = self
            .remembered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(tool.to_string(), decision);
    }
}

impl PermissionPrompter for TerminalPrompter {
    fn confirm(&self, request: &PermissionRequest<'_>) -> Result<Decision> {
        if let Some(decision) = self.remembered(request.tool) {
            return Ok(decision);
        }

        eprintln!(
            "\n{} {} wants to run {}:",
            "?".yellow().bold(),
            request.agent.cyan(),
            request.tool.bold()
        );
        match preview(request) {
            Some(diff) => eprint!("{}", diff::colorize(&diff)),
            None => eprintln!("{}", summarize_args(request.args)),
        }
        eprint!("\nAllow? [y]es / [n]o / [a]lways / [d]eny always: ");
        io::stderr().flush()?;

        // Blocks the runtime thread; a Ctrl+C pressed meanwhile is acted on
        // by the runner once this returns.
        let mut response = String::new();
        io::stdin().read_line(&mut response)?;

        let decision = match response.trim().to_lowercase().as_str() {
            "y" | "yes" => Decision::ApproveOnce,
            "a" | "always" => Decision::ApproveAlways,
            "d" | "deny" => Decision::DenyAlways,
            _ => Decision::DenyOnce,
        };
        if matches!(decision, Decision::ApproveAlways | Decision::DenyAlways) {
            self.remember(request.tool, decision);
        }
        Ok(decision)
    }
}

/// Short form of the arguments: the bash command itself, or truncated JSON.
fn summarize_args(args: &Value) -> String {
    if let Some(command) = args.get("command").and_then(Value::as_str) {
        return format!("  $ {}", command);
    }
    let text = args.to_string();
    if text.chars().count() > 200 {
        let head: String = text.chars().take(200).collect();
        format!("  {}...", head)
    } else {
        format!("  {}", text)
    }
}

/// Diff of what a write_file or edit call would change, if it can be computed.
///
/// Paths outside the working directory get no preview, so the prompt never
/// shows the contents of files the tools themselves may not touch.
fn preview(request: &PermissionRequest<'_>) -> Option<String> {
    let path = request.args.get("path")?.as_str()?;
    let existing = tools::resolve_existing(request.working_dir, path).ok();
    match request.tool {
        "write_file" => {
            let content = request.args.get("content")?.as_str()?;
            match existing {
                Some(full) => {
                    let old = std::fs::read_to_string(full).ok()?;
                    Some(diff::unified(&old, content, path))
                }
                None if tools::stays_within(request.working_dir, path) => {
                    Some(diff::new_file_preview(content, path))
                }
                None => None,
            }
        }
        "edit" => {
            let input: EditInput = serde_json::from_value(request.args.clone()).ok()?;
            let old = std::fs::read_to_string(existing?).ok()?;
            let new = input.apply(&old)?;
            Some(diff::unified(&old, &new, path))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_permission_serde() {
        let p: Permission = serde_json::from_value(json!("ask")).unwrap();
        assert_eq!(p, Permission::Ask);
        assert_eq!(Permission::Deny.to_string(), "deny");
    }

    #[test]
    fn test_decision_approved() {
        assert!(Decision::ApproveOnce.approved());
        assert!(Decision::ApproveAlways.approved());
        assert!(!Decision::DenyOnce.approved());
        assert!(!Decision::DenyAlways.approved());
    }

    #[test]
    fn test_remembered_decision_skips_prompt() {
        let prompter = TerminalPrompter::new();
        prompter.remember("bash", Decision::DenyAlways);
        let args = json!({"command": "rm -rf /"});
        let request = PermissionRequest {
            tool: "bash",
            args: &args,
            agent: "plan",
            working_dir: Path::new("."),
        };
        assert_eq!(prompter.confirm(&request).unwrap(), Decision::DenyAlways);
    }

    #[test]
    fn test_edit_preview() {
        let dir = std::env::temp_dir().join(format!("kiri_perm_preview_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.txt"), "one\ntwo\n").unwrap();

        let args = json!({"path": "a.txt", "old_text": "two", "new_text": "2"});
        let request = PermissionRequest {
            tool: "edit",
            args: &args,
            agent: "build",
            working_dir: &dir,
        };
        let diff = preview(&request).unwrap();
        assert!(diff.contains("-two"));
        assert!(diff.contains("+2"));

        let args = json!({"path": "new.txt", "content": "hi"});
        let request = PermissionRequest {
            tool: "write_file",
            args: &args,
            agent: "build",
            working_dir: &dir,
        };
        assert!(preview(&request).unwrap().starts_with("--- /dev/null"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_no_preview_outside_working_dir() {
        let root = std::env::temp_dir().join(format!("kiri_perm_escape_{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let work = root.join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(root.join("secret.txt"), "token=abc\n").unwrap();

        let args = json!({"path": "../secret.txt", "old_text": "abc", "new_text": "x"});
        let request = PermissionRequest {
            tool: "edit",
            args: &args,
            agent: "build",
            working_dir: &work,
        };
        assert!(preview(&request).is_none());

        let args = json!({"path": "../secret.txt", "content": "overwritten"});
        let request = PermissionRequest {
            tool: "write_file",
            args: &args,
            agent: "build",
            working_dir: &work,
        };
        assert!(preview(&request).is_none());

        let args = json!({"path": "../elsewhere/new.txt", "content": "hi"});
        let request = PermissionRequest {
            tool: "write_file",
            args: &args,
            agent: "build",
            working_dir: &work,
        };
        assert!(preview(&request).is_none());

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_summarize_args() {
        assert_eq!(summarize_args(&json!({"command": "ls"})), "  $ ls");
        assert!(summarize_args(&json!({"x": "y".repeat(300)})).ends_with("..."));
    }
}
