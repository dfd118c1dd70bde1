//! Webfetch tool: HTTP GET/POST with a size cap and timeout.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{Tool, ToolContext, ToolResult};

use crate::constants::{WEBFETCH_MAX_SIZE, WEBFETCH_TIMEOUT_SECS};

pub struct WebFetchTool;

#[derive(Deserialize)]
struct WebFetchInput {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: Map<String, Value>,
    body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[async_trait::async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "webfetch"
    }

    fn description(&self) -> &str {
        "Fetch content from an http:// or https:// URL. Supports GET and POST, custom headers, \
         and a request body. Responses are capped in size and time out after 30 seconds."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to fetch (must start with http:// or https://)",
                    "pattern": "^https?://"
                },
                "method": {
                    "type": "string",
                    "description": "HTTP method (default: GET)",
                    "enum": ["GET", "POST"]
                },
                "headers": {
                    "type": "object",
                    "description": "Custom request headers"
                },
                "body": {
                    "type": "string",
                    "description": "Request body for POST requests"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: WebFetchInput = serde_json::from_value(args)?;
        let title = input.url.clone();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBFETCH_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        let mut request = match input.method.as_str() {
            "POST" => client.post(&input.url),
            _ => client.get(&input.url),
        };
        for (key, value) in &input.headers {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            request = request.header(key.as_str(), value);
        }
        if let (Some(body), "POST") = (input.body, input.method.as_str()) {
            request = request.body(body);
        }

        let fetch = async {
            let mut response = request.send().await?;
            let status = response.status();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();

            let mut body: Vec<u8> = Vec::new();
            let mut truncated = false;
            while let Some(chunk) = response.chunk().await? {
                let room = WEBFETCH_MAX_SIZE - body.len();
                if chunk.len() > room {
                    body.extend_from_slice(&chunk[..room]);
                    truncated = true;
                    break;
                }
                body.extend_from_slice(&chunk);
            }
            Ok::<_, reqwest::Error>((status, content_type, body, truncated))
        };

        let (status, content_type, body, truncated) = tokio::select! {
            r = fetch => r.with_context(|| format!("Request to {} failed", input.url))?,
            _ = ctx.cancel.cancelled() => {
                return Ok(ToolResult::error(title, "Request cancelled"));
            }
        };

        let text = String::from_utf8_lossy(&body);
        let mut output = format!(
            "URL: {}\nStatus: {}\nContent-Type: {}\n\n{}",
            input.url, status, content_type, text
        );
        if truncated {
            output.push_str(&format!("\n... response truncated at {} bytes", WEBFETCH_MAX_SIZE));
        }

        let metadata = json!({
            "status": status.as_u16(),
            "content_type": content_type,
            "bytes": body.len(),
            "truncated": truncated,
        });

        if status.is_client_error() || status.is_server_error() {
            let mut result = ToolResult::error(&title, format!("HTTP {}", status));
            result.output = output;
            return Ok(result.with_metadata(metadata));
        }
        Ok(ToolResult::success(title, output).with_metadata(metadata))
    }
}
