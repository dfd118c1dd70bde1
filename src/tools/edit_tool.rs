//! Edit tool: search-and-replace based file editing within the working directory.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{resolve_existing, Tool, ToolContext, ToolResult};
use crate::diff;

/// Tool that performs search-and-replace edits on existing files.
///
/// Finds exact text matches and replaces them, optionally replacing all
/// occurrences. Path traversal outside the working directory is rejected.
pub struct EditTool;

#[derive(Deserialize)]
pub(crate) struct EditInput {
    pub path: String,
    pub old_text: String,
    pub new_text: String,
    #[serde(default)]
    pub replace_all: bool,
}

impl EditInput {
    /// Applies the replacement to `content`, or `None` if `old_text` is absent.
    pub(crate) fn apply(&self, content: &str) -> Option<String> {
        if self.old_text.is_empty() || !content.contains(&self.old_text) {
            return None;
        }
        Some(if self.replace_all {
            content.replace(&self.old_text, &self.new_text)
        } else {
            content.replacen(&self.old_text, &self.new_text, 1)
        })
    }
}

#[async_trait::async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Search and replace text in an existing file. Finds exact text matches and replaces them. \
         Path is relative to the working directory."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the working directory"
                },
                "old_text": {
                    "type": "string",
                    "description": "Exact text to search for in the file",
                    "minLength": 1
                },
                "new_text": {
                    "type": "string",
                    "description": "Text to replace old_text with"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false, replaces first only)"
                }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: EditInput = serde_json::from_value(args)?;
        let path = resolve_existing(&ctx.working_dir, &input.path)?;

        let content = tokio::fs::read_to_string(&path).await?;
        let occurrences = content.matches(&input.old_text).count();

        let Some(new_content) = input.apply(&content) else {
            return Ok(ToolResult::error(
                &input.path,
                format!(
                    "Text not found in {}. Make sure the old_text matches exactly, \
                     including whitespace and indentation.",
                    input.path
                ),
            ));
        };

        tokio::fs::write(&path, &new_content).await?;

        let replaced = if input.replace_all { occurrences } else { 1 };
        let diff = diff::unified(&content, &new_content, &input.path);
        Ok(
            ToolResult::success(&input.path, format!("Edited {}\n\n{}", input.path, diff))
                .with_metadata(json!({ "replacements": replaced })),
        )
    }
}
