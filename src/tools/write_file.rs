//! Write-file tool: writes content to a file, creating parent directories as needed.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{resolve_for_write, Tool, ToolContext, ToolResult};

/// Tool that writes string content to a file within the working directory.
///
/// Parent directories are created automatically. Path traversal outside
/// the working directory is rejected.
pub struct WriteFileTool;

#[derive(Deserialize)]
struct WriteFileInput {
    path: String,
    content: String,
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, replacing it if it exists. Creates parent directories as needed. \
         Path is relative to the working directory."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the working directory",
                    "minLength": 1
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: WriteFileInput = serde_json::from_value(args)?;
        let path = resolve_for_write(&ctx.working_dir, &input.path)?;
        let existed = path.exists();

        tokio::fs::write(&path, &input.content).await?;

        let bytes_written = input.content.len();
        Ok(ToolResult::success(
            &input.path,
            format!("Wrote {} bytes to {}", bytes_written, input.path),
        )
        .with_metadata(json!({
            "bytes": bytes_written,
            "created": !existed,
        })))
    }
}
