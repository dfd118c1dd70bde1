//! Bash tool: shell command execution with safety measures.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{Tool, ToolContext, ToolResult};

use crate::constants::{
    BASH_DEFAULT_TIMEOUT_SECS, BASH_MAX_OUTPUT_SIZE, BASH_MAX_TIMEOUT_SECS, BASH_STRIPPED_ENV_VARS,
};

/// Tool that executes shell commands in a child process.
///
/// Commands run in the working directory with a timeout, an output size cap,
/// and sensitive environment variables stripped. The child is killed when the
/// run is cancelled.
pub struct BashTool;

#[derive(Deserialize)]
struct BashInput {
    command: String,
    timeout: Option<u64>,
}

/// Truncate `output` to at most `BASH_MAX_OUTPUT_SIZE` bytes, appending a
/// notice when truncation occurs.
fn cap_output(output: &str) -> String {
    if output.len() <= BASH_MAX_OUTPUT_SIZE {
        return output.to_string();
    }
    let mut end = BASH_MAX_OUTPUT_SIZE;
    while end > 0 && !output.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n... output truncated at {} bytes",
        &output[..end],
        BASH_MAX_OUTPUT_SIZE
    )
}

#[async_trait::async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output. Commands run in the working directory \
         with a timeout (default 30s, max 600s)."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute",
                    "minLength": 1
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 30, max 600)",
                    "minimum": 1
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: BashInput = serde_json::from_value(args)?;
        let title = input.command.clone();

        let timeout_secs = input
            .timeout
            .unwrap_or(BASH_DEFAULT_TIMEOUT_SECS)
            .min(BASH_MAX_TIMEOUT_SECS);

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&input.command);
        cmd.current_dir(&ctx.working_dir);
        cmd.kill_on_drop(true);

        for var in BASH_STRIPPED_ENV_VARS {
            cmd.env_remove(var);
        }

        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return Ok(ToolResult::error(
                    title,
                    format!("Failed to execute command: {}", e),
                ));
            }
        };

        // Dropping the wait future drops the child, which kills it.
        let result = tokio::select! {
            r = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()) => r,
            _ = ctx.cancel.cancelled() => {
                return Ok(ToolResult::error(title, "Command cancelled"));
            }
        };

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                let mut text = stdout.to_string();
                if !stderr.is_empty() {
                    text.push_str("\n--- stderr ---\n");
                    text.push_str(&stderr);
                }

                let text = cap_output(&text);
                let code = output.status.code().unwrap_or(-1);
                let metadata = json!({ "exit_code": code });

                if code != 0 {
                    let mut result = ToolResult::error(&title, format!("Exit code: {}", code));
                    result.output = text.trim().to_string();
                    Ok(result.with_metadata(metadata))
                } else {
                    Ok(ToolResult::success(title, text.trim()).with_metadata(metadata))
                }
            }
            Ok(Err(e)) => Ok(ToolResult::error(
                title,
                format!("Failed to execute command: {}", e),
            )),
            Err(_) => Ok(ToolResult::error(
                title,
                format!("Command timed out after {}s", timeout_secs),
            )),
        }
    }
}
