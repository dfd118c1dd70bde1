//! Directory listing tool.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use super::{resolve_existing, Tool, ToolContext, ToolResult};

use crate::constants::LS_MAX_ENTRIES;

/// Lists a directory with directories first, then files, each group sorted
/// case-insensitively. Optionally recurses to `max_depth`.
pub struct LsTool;

#[derive(Deserialize)]
struct LsInput {
    #[serde(default = "default_path")]
    path: String,
    #[serde(default = "default_true")]
    show_hidden: bool,
    #[serde(default)]
    recursive: bool,
    #[serde(default = "default_depth")]
    max_depth: usize,
}

fn default_path() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

fn default_depth() -> usize {
    1
}

fn format_size(size: u64) -> String {
    const K: f64 = 1024.0;
    let s = size as f64;
    if s < K {
        format!("{}B", size)
    } else if s < K * K {
        format!("{:.1}K", s / K)
    } else if s < K * K * K {
        format!("{:.1}M", s / (K * K))
    } else {
        format!("{:.1}G", s / (K * K * K))
    }
}

struct Listing {
    show_hidden: bool,
    recursive: bool,
    max_depth: usize,
    lines: Vec<String>,
    truncated: bool,
}

impl Listing {
    fn list(&mut self, dir: &Path, depth: usize) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.lines
                    .push(format!("{}({})", "  ".repeat(depth), e));
                return;
            }
        };

        let mut items: Vec<(bool, String, u64, std::path::PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if !self.show_hidden && name.starts_with('.') {
                    return None;
                }
                let meta = e.metadata().ok()?;
                Some((meta.is_dir(), name, meta.len(), e.path()))
            })
            .collect();
        items.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase())));

        for (is_dir, name, size, path) in items {
            if self.lines.len() >= LS_MAX_ENTRIES {
                self.truncated = true;
                return;
            }
            let indent = "  ".repeat(depth);
            if is_dir {
                self.lines.push(format!("{}{}/", indent, name));
                if self.recursive && depth < self.max_depth {
                    self.list(&path, depth + 1);
                }
            } else {
                self.lines
                    .push(format!("{}{}  ({})", indent, name, format_size(size)));
            }
        }
    }
}

#[async_trait::async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List directory contents, directories first. Path is relative to the working directory \
         and defaults to it. Use glob for pattern matching."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: working directory)"
                },
                "show_hidden": {
                    "type": "boolean",
                    "description": "Include dotfiles (default: true)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "List subdirectories recursively (default: false)"
                },
                "max_depth": {
                    "type": "integer",
                    "description": "Maximum recursion depth (default: 1)",
                    "minimum": 0,
                    "maximum": 10
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: LsInput = serde_json::from_value(args)?;
        let path = resolve_existing(&ctx.working_dir, &input.path)?;

        if path.is_file() {
            let size = fs::metadata(&path)?.len();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Ok(ToolResult::success(
                &input.path,
                format!("{}  ({})", name, format_size(size)),
            )
            .with_metadata(json!({ "type": "file", "count": 1 })));
        }

        let mut listing = Listing {
            show_hidden: input.show_hidden,
            recursive: input.recursive,
            max_depth: input.max_depth,
            lines: Vec::new(),
            truncated: false,
        };
        listing.list(&path, 0);

        let count = listing.lines.len();
        let output = if listing.lines.is_empty() {
            format!("Directory is empty: {}", input.path)
        } else if listing.truncated {
            format!(
                "{}\n... truncated at {} entries",
                listing.lines.join("\n"),
                LS_MAX_ENTRIES
            )
        } else {
            listing.lines.join("\n")
        };

        Ok(ToolResult::success(&input.path, output).with_metadata(json!({
            "type": "directory",
            "count": count,
            "truncated": listing.truncated,
        })))
    }
}
