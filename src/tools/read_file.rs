use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{resolve_existing, Tool, ToolContext, ToolResult};

use crate::constants::{BINARY_DETECTION_BYTES, READ_FILE_MAX_SIZE};

/// Default number of lines returned when no limit is given.
const DEFAULT_LINE_LIMIT: usize = 2000;

pub struct ReadFileTool;

#[derive(Deserialize)]
struct ReadFileInput {
    path: String,
    /// 1-based first line to return.
    offset: Option<usize>,
    limit: Option<usize>,
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file with line numbers. Path is relative to the working directory. \
         Use offset and limit to page through large files."
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
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-based, default 1)",
                    "minimum": 1
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default 2000)",
                    "minimum": 1
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: ReadFileInput = serde_json::from_value(args)?;
        let path = resolve_existing(&ctx.working_dir, &input.path)?;

        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.is_dir() {
            return Ok(ToolResult::error(
                &input.path,
                format!("{} is a directory; use ls instead", input.path),
            ));
        }
        if metadata.len() > READ_FILE_MAX_SIZE {
            return Ok(ToolResult::error(
                &input.path,
                format!(
                    "File too large: {} bytes (max {})",
                    metadata.len(),
                    READ_FILE_MAX_SIZE
                ),
            ));
        }

        let content = tokio::fs::read(&path).await?;
        let check_len = content.len().min(BINARY_DETECTION_BYTES);
        if content[..check_len].contains(&0) {
            return Ok(ToolResult::error(
                &input.path,
                "Binary file detected. Cannot display binary content.",
            ));
        }

        let text = String::from_utf8(content)
            .map_err(|_| anyhow::anyhow!("File is not valid UTF-8"))?;

        let offset = input.offset.unwrap_or(1).max(1);
        let limit = input.limit.unwrap_or(DEFAULT_LINE_LIMIT);
        let total_lines = text.lines().count();
        let numbered: Vec<String> = text
            .lines()
            .enumerate()
            .skip(offset - 1)
            .take(limit)
            .map(|(i, line)| format!("{:>6}\t{}", i + 1, line))
            .collect();
        let shown = numbered.len();

        let mut output = numbered.join("\n");
        let last_shown = offset - 1 + shown;
        if last_shown < total_lines {
            output.push_str(&format!(
                "\n\n(showing lines {}-{} of {}; use offset to read more)",
                offset, last_shown, total_lines
            ));
        }

        Ok(ToolResult::success(&input.path, output).with_metadata(json!({
            "lines": shown,
            "total_lines": total_lines,
        })))
    }
}
