pub mod bash_tool;
pub mod edit_tool;
pub mod glob_tool;
pub mod grep_tool;
pub mod ls_tool;
pub mod multiedit_tool;
pub mod read_file;
pub mod todo_tool;
pub mod validate;
pub mod webfetch_tool;
pub mod write_file;

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::AgentConfig;
use crate::message::{MessageId, ToolResultPart};
use crate::provider::ToolDefinition;
use crate::storage::Storage;

use bash_tool::BashTool;
use edit_tool::EditTool;
use glob_tool::GlobTool;
use grep_tool::GrepTool;
use ls_tool::LsTool;
use multiedit_tool::MultiEditTool;
use read_file::ReadFileTool;
use todo_tool::TodoTool;
use webfetch_tool::WebFetchTool;
use write_file::WriteFileTool;

/// Per-call information handed to a tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub message_id: MessageId,
    pub call_id: String,
    pub agent: String,
    /// Directory the tool operates in. Paths never escape it.
    pub working_dir: PathBuf,
    /// Fires when the caller aborts the run.
    pub cancel: CancellationToken,
}

/// The normalized outcome of executing a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub title: String,
    pub output: String,
    pub metadata: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(title: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: output.into(),
            metadata: Value::Null,
            error: None,
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: String::new(),
            metadata: Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Converts into the persisted part answering `call_id`.
    pub fn into_part(self, call_id: &str) -> ToolResultPart {
        ToolResultPart {
            call_id: call_id.to_string(),
            title: self.title,
            output: self.output,
            error: self.error,
            metadata: self.metadata,
        }
    }
}

/// Every tool implements this trait.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the LLM uses to call this tool.
    fn name(&self) -> &str;

    /// Human-readable description for the LLM.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's input parameters.
    fn schema(&self) -> Value;

    /// Execute the tool. Arguments have already been validated against
    /// [`Tool::schema`]; an `Err` is reported to the model as an error result.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

/// Holds all registered tools and dispatches calls by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in tools that need no storage.
    ///
    /// The `todo` tool keeps state and is added with [`ToolRegistry::with_storage`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(WriteFileTool));
        registry.register(Arc::new(EditTool));
        registry.register(Arc::new(MultiEditTool));
        registry.register(Arc::new(LsTool));
        registry.register(Arc::new(GlobTool));
        registry.register(Arc::new(GrepTool));
        registry.register(Arc::new(BashTool));
        registry.register(Arc::new(WebFetchTool));
        registry
    }

    /// Built-in tools plus the ones that persist per-session state in `storage`.
    pub fn with_storage(storage: Storage) -> Self {
        let mut registry = Self::with_builtins();
        registry.register(Arc::new(TodoTool::new(storage)));
        registry
    }

    /// Register a tool under its name, replacing any tool already there.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let replaced = self.tools.insert(tool.name().to_string(), tool);
        if let Some(old) = &replaced {
            debug!(tool = old.name(), "replaced registered tool");
        }
        replaced
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for every tool the agent may call, sorted by name so the
    /// request shape is stable between iterations.
    pub fn definitions_for(&self, agent: &AgentConfig) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|t| agent.is_tool_enabled(t.name()))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Look up a tool by name, validate `args`, and execute it.
    ///
    /// Never fails: unknown tools, invalid arguments and tool errors all
    /// come back as a [`ToolResult`] with `error` set.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::error(name, format!("Unknown tool: {}", name));
        };

        if let Err(errors) = validate::validate_args(&tool.schema(), &args) {
            debug!(tool = name, ?errors, "tool arguments rejected");
            return ToolResult::error(
                name,
                format!(
                    "Invalid parameters for tool '{}':\n{}",
                    name,
                    errors
                        .iter()
                        .map(|e| format!("  - {}", e))
                        .collect::<Vec<_>>()
                        .join("\n")
                ),
            )
            .with_metadata(serde_json::json!({ "validation_errors": errors }));
        }

        debug!(tool = name, call_id = %ctx.call_id, "executing tool");
        match tool.execute(args, ctx).await {
            Ok(result) => result,
            Err(e) => ToolResult::error(name, format!("{:#}", e))
                .with_metadata(serde_json::json!({ "fault": e.to_string() })),
        }
    }
}

/// Resolve an existing path and check it stays within `root`.
pub(crate) fn resolve_existing(root: &Path, path: &str) -> Result<PathBuf> {
    let resolved = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        root.join(path)
    };
    let canonical = resolved
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("Cannot access {}: {}", path, e))?;
    let root_canonical = root.canonicalize()?;
    if !canonical.starts_with(&root_canonical) {
        anyhow::bail!("Path escapes project directory: {}", path);
    }
    Ok(canonical)
}

/// Resolve a path that may not exist yet, creating its parent directories.
///
/// The parent is canonicalized instead of the file itself.
pub(crate) fn resolve_for_write(root: &Path, path: &str) -> Result<PathBuf> {
    let resolved = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        root.join(path)
    };

    let parent = resolved
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Path has no parent directory: {}", path))?;
    let root_canonical = root.canonicalize()?;

    // Refuse before creating anything outside the root.
    let lexical = normalize(&std::path::absolute(parent)?);
    if !lexical.starts_with(&root_canonical) && !lexical.starts_with(normalize(&std::path::absolute(root)?)) {
        anyhow::bail!("Path escapes project directory: {}", path);
    }

    fs::create_dir_all(parent)?;
    let parent_canonical = parent.canonicalize()?;
    if !parent_canonical.starts_with(&root_canonical) {
        anyhow::bail!("Path escapes project directory: {}", path);
    }

    let filename = resolved
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Path has no filename: {}", path))?;
    Ok(parent_canonical.join(filename))
}

/// True if `path` stays within `root` once `.` and `..` are folded.
///
/// Nothing is created or read; symlinks are not followed.
pub(crate) fn stays_within(root: &Path, path: &str) -> bool {
    match (std::path::absolute(root.join(path)), std::path::absolute(root)) {
        (Ok(full), Ok(root)) => normalize(&full).starts_with(normalize(&root)),
        _ => false,
    }
}

/// Lexically folds `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests;
