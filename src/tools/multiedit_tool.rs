//! Multi-edit tool: a batch of search-and-replace edits applied all-or-nothing.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

use super::edit_tool::EditInput;
use super::{resolve_existing, Tool, ToolContext, ToolResult};
use crate::diff;

/// Applies several edits, possibly to several files, in one call.
///
/// Every edit is computed in memory first; if any of them fails nothing is
/// written. Edits to the same file apply in order, each to the result of
/// the previous one. A failed write restores the files already written.
pub struct MultiEditTool;

#[derive(Deserialize)]
struct MultiEditInput {
    edits: Vec<EditInput>,
    #[serde(default)]
    dry_run: bool,
}

/// One file touched by the batch.
struct FileChange {
    display: String,
    path: PathBuf,
    original: String,
    updated: String,
    replacements: usize,
}

#[async_trait::async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        "multiedit"
    }

    fn description(&self) -> &str {
        "Apply several exact-text replacements, across one or more files, as a single change. \
         Either every edit applies or none does. Set dry_run to preview the diffs without \
         writing. Paths are relative to the working directory."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "edits": {
                    "type": "array",
                    "description": "Edits to apply in order",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": { "type": "string" },
                            "old_text": { "type": "string", "minLength": 1 },
                            "new_text": { "type": "string" },
                            "replace_all": { "type": "boolean" }
                        },
                        "required": ["path", "old_text", "new_text"]
                    }
                },
                "dry_run": {
                    "type": "boolean",
                    "description": "Show the diffs without modifying any file (default: false)"
                }
            },
            "required": ["edits"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: MultiEditInput = serde_json::from_value(args)?;
        if input.edits.is_empty() {
            return Ok(ToolResult::error("multiedit", "No edits provided"));
        }

        let mut changes: Vec<FileChange> = Vec::new();
        for (i, edit) in input.edits.iter().enumerate() {
            let path = resolve_existing(&ctx.working_dir, &edit.path)?;
            let index = match changes.iter().position(|c| c.path == path) {
                Some(index) => index,
                None => {
                    let original = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Cannot read {}", edit.path))?;
                    changes.push(FileChange {
                        display: edit.path.clone(),
                        path,
                        updated: original.clone(),
                        original,
                        replacements: 0,
                    });
                    changes.len() - 1
                }
            };

            let change = &mut changes[index];
            let occurrences = change.updated.matches(&edit.old_text).count();
            let Some(updated) = edit.apply(&change.updated) else {
                return Ok(ToolResult::error(
                    "multiedit",
                    format!(
                        "Edit {} failed: text not found in {}. No files were modified.",
                        i + 1,
                        edit.path
                    ),
                ));
            };
            change.updated = updated;
            change.replacements += if edit.replace_all { occurrences } else { 1 };
        }

        if !input.dry_run {
            for (written, change) in changes.iter().enumerate() {
                if let Err(e) = tokio::fs::write(&change.path, &change.updated).await {
                    for done in &changes[..written] {
                        if let Err(restore) = tokio::fs::write(&done.path, &done.original).await {
                            tracing::warn!(path = %done.display, error = %restore, "multiedit rollback failed");
                        }
                    }
                    return Ok(ToolResult::error(
                        "multiedit",
                        format!(
                            "Failed to write {}: {}. Earlier files were restored.",
                            change.display, e
                        ),
                    ));
                }
            }
        }

        let total: usize = changes.iter().map(|c| c.replacements).sum();
        let mut output = format!(
            "{}{} file(s), {} replacement(s)\n",
            if input.dry_run { "Dry run: " } else { "Edited " },
            changes.len(),
            total
        );
        for change in &changes {
            output.push('\n');
            output.push_str(&diff::unified(&change.original, &change.updated, &change.display));
        }
        if input.dry_run {
            output.push_str("\nNo files were modified.");
        }

        let files: Vec<&str> = changes.iter().map(|c| c.display.as_str()).collect();
        Ok(
            ToolResult::success(format!("{} files", changes.len()), output).with_metadata(json!({
                "files": files,
                "replacements": total,
                "dry_run": input.dry_run,
            })),
        )
    }
}
