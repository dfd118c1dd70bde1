use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolResult};

use crate::constants::GLOB_MAX_RESULTS;

pub struct GlobTool;

#[derive(Deserialize)]
struct GlobInput {
    pattern: String,
}

#[async_trait::async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "List files matching a glob pattern relative to the working directory."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern (e.g. 'src/**/*.rs')",
                    "minLength": 1
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: GlobInput = serde_json::from_value(args)?;
        let root = &ctx.working_dir;
        let full_pattern = root.join(&input.pattern);
        let pattern_str = full_pattern.to_string_lossy();

        let root_canonical = root.canonicalize()?;

        let mut paths: Vec<String> = Vec::new();
        let mut truncated = false;
        for entry in glob::glob(&pattern_str)? {
            if paths.len() >= GLOB_MAX_RESULTS {
                truncated = true;
                break;
            }
            let entry = entry?;
            // Broken symlinks and anything outside the root are skipped.
            match entry.canonicalize() {
                Ok(canonical) if canonical.starts_with(&root_canonical) => {}
                _ => continue,
            }
            let relative = entry.strip_prefix(root).unwrap_or(&entry);
            paths.push(relative.display().to_string());
        }

        let count = paths.len();
        let output = if paths.is_empty() {
            "No files matched the pattern.".to_string()
        } else if truncated {
            format!(
                "{}\n... truncated at {} results",
                paths.join("\n"),
                GLOB_MAX_RESULTS
            )
        } else {
            paths.join("\n")
        };
        Ok(ToolResult::success(&input.pattern, output)
            .with_metadata(json!({ "count": count, "truncated": truncated })))
    }
}
