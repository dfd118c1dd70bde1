use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use super::{resolve_existing, Tool, ToolContext, ToolResult};

use crate::constants::{BINARY_DETECTION_BYTES, GREP_MAX_MATCHES};

pub struct GrepTool;

/// One walk over a directory tree collecting `path:line:content` matches.
struct Search<'a> {
    root: &'a Path,
    regex: &'a Regex,
    include: Option<glob::Pattern>,
    matches: Vec<String>,
}

impl Search<'_> {
    fn full(&self) -> bool {
        self.matches.len() >= GREP_MAX_MATCHES
    }

    /// Recursively walk directories, searching files for regex matches.
    fn walk(&mut self, dir: &Path) {
        if self.full() {
            return;
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return, // silently skip unreadable dirs
        };

        let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            if self.full() {
                return;
            }

            let path = entry.path();
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();

            if path.is_dir() {
                // Skip hidden dirs, target/, node_modules/
                if name.starts_with('.') || name == "target" || name == "node_modules" {
                    continue;
                }
                self.walk(&path);
            } else if path.is_file() {
                if let Some(ref pattern) = self.include {
                    if !pattern.matches(&name) {
                        continue;
                    }
                }
                self.search_file(&path);
            }
        }
    }

    /// Search a single file, skipping binary and non-UTF-8 content.
    fn search_file(&mut self, path: &Path) {
        let content = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => return,
        };

        let check_len = content.len().min(BINARY_DETECTION_BYTES);
        if content[..check_len].contains(&0) {
            return;
        }

        let text = match String::from_utf8(content) {
            Ok(s) => s,
            Err(_) => return,
        };

        let relative = path.strip_prefix(self.root).unwrap_or(path);

        for (line_num, line) in text.lines().enumerate() {
            if self.full() {
                return;
            }
            if self.regex.is_match(line) {
                self.matches
                    .push(format!("{}:{}:{}", relative.display(), line_num + 1, line));
            }
        }
    }
}

#[derive(Deserialize)]
struct GrepInput {
    pattern: String,
    path: Option<String>,
    include: Option<String>,
}

#[async_trait::async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents using a regex pattern. Returns matching lines with file paths and line numbers."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for",
                    "minLength": 1
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search in (relative to the working directory, defaults to '.')"
                },
                "include": {
                    "type": "string",
                    "description": "Glob pattern to filter file names (e.g. '*.rs')"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: GrepInput = serde_json::from_value(args)?;

        let regex = match Regex::new(&input.pattern) {
            Ok(r) => r,
            Err(e) => {
                return Ok(ToolResult::error(
                    &input.pattern,
                    format!("Invalid regex: {}", e),
                ))
            }
        };

        let root = ctx.working_dir.canonicalize()?;
        let search_root = match input.path.as_deref() {
            Some(path) => resolve_existing(&ctx.working_dir, path)?,
            None => root.clone(),
        };
        let include = match input.include.as_deref().map(glob::Pattern::new) {
            Some(Ok(p)) => Some(p),
            Some(Err(e)) => {
                return Ok(ToolResult::error(
                    &input.pattern,
                    format!("Invalid include pattern: {}", e),
                ))
            }
            None => None,
        };

        let mut search = Search {
            root: &root,
            regex: &regex,
            include,
            matches: Vec::new(),
        };
        search.walk(&search_root);

        let count = search.matches.len();
        let truncated = search.full();
        let output = if search.matches.is_empty() {
            "No matches found.".to_string()
        } else if truncated {
            format!(
                "{}\n... truncated at {} matches",
                search.matches.join("\n"),
                GREP_MAX_MATCHES
            )
        } else {
            search.matches.join("\n")
        };
        Ok(ToolResult::success(&input.pattern, output)
            .with_metadata(json!({ "matches": count, "truncated": truncated })))
    }
}
