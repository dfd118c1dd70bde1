//! Todo tool: a per-session task list the model keeps while it works.

use anyhow::{bail, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use super::{Tool, ToolContext, ToolResult};
use crate::storage::Storage;

/// Stores todos under `["todo", <session id>]`, so they survive across runs
/// of the same session and are removed with it.
pub struct TodoTool {
    storage: Storage,
}

impl TodoTool {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn load(&self, session_id: &str) -> Result<TodoList> {
        Ok(self.storage.read(&["todo", session_id])?.unwrap_or_default())
    }

    fn save(&self, session_id: &str, list: &mut TodoList) -> Result<()> {
        list.updated_at = Some(Utc::now().to_rfc3339());
        self.storage.write(&["todo", session_id], list)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TodoStatus::Pending => write!(f, "pending"),
            TodoStatus::InProgress => write!(f, "in_progress"),
            TodoStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: u64,
    pub task: String,
    pub status: TodoStatus,
    pub created_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TodoList {
    updated_at: Option<String>,
    todos: Vec<TodoItem>,
}

impl TodoList {
    fn count(&self, status: TodoStatus) -> usize {
        self.todos.iter().filter(|t| t.status == status).count()
    }

    fn find(&mut self, id: u64) -> Result<&mut TodoItem> {
        match self.todos.iter_mut().find(|t| t.id == id) {
            Some(item) => Ok(item),
            None => bail!("Task {} not found", id),
        }
    }

    fn render(&self) -> String {
        if self.todos.is_empty() {
            return "No todos".to_string();
        }
        let mut out = String::new();
        for (status, heading) in [
            (TodoStatus::InProgress, "In progress"),
            (TodoStatus::Pending, "Pending"),
            (TodoStatus::Completed, "Completed"),
        ] {
            let items: Vec<&TodoItem> = self.todos.iter().filter(|t| t.status == status).collect();
            if items.is_empty() {
                continue;
            }
            out.push_str(&format!("{}:\n", heading));
            for item in items {
                out.push_str(&format!("  [{}] {}\n", item.id, item.task));
            }
        }
        out.push_str(&format!(
            "\n{} tasks: {} completed, {} in progress, {} pending",
            self.todos.len(),
            self.count(TodoStatus::Completed),
            self.count(TodoStatus::InProgress),
            self.count(TodoStatus::Pending)
        ));
        out
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Operation {
    List,
    Add,
    Update,
    Complete,
    Remove,
    Clear,
}

#[derive(Deserialize)]
struct TodoInput {
    operation: Operation,
    task: Option<String>,
    task_id: Option<u64>,
    status: Option<TodoStatus>,
}

impl TodoInput {
    fn task_id(&self, operation: &str) -> Result<u64> {
        match self.task_id {
            Some(id) => Ok(id),
            None => bail!("task_id is required for {}", operation),
        }
    }
}

#[async_trait::async_trait]
impl Tool for TodoTool {
    fn name(&self) -> &str {
        "todo"
    }

    fn description(&self) -> &str {
        "Track the steps of a multi-step task. Operations: list, add (task), update (task_id, \
         status), complete (task_id), remove (task_id), clear. Todos belong to the current \
         session and persist between requests."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["list", "add", "update", "complete", "remove", "clear"]
                },
                "task": {
                    "type": "string",
                    "description": "Task description (add)",
                    "minLength": 1
                },
                "task_id": {
                    "type": "integer",
                    "description": "Task id (update, complete, remove)",
                    "minimum": 1
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "completed"],
                    "description": "New status (update)"
                }
            },
            "required": ["operation"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: TodoInput = serde_json::from_value(args)?;
        let mut list = self.load(&ctx.session_id)?;

        let (title, output) = match input.operation {
            Operation::List => {
                let title = format!("Todos ({})", list.todos.len());
                return Ok(ToolResult::success(title, list.render()).with_metadata(json!({
                    "total": list.todos.len(),
                    "pending": list.count(TodoStatus::Pending),
                    "in_progress": list.count(TodoStatus::InProgress),
                    "completed": list.count(TodoStatus::Completed),
                })));
            }
            Operation::Add => {
                let Some(task) = input.task.clone() else {
                    bail!("task is required for add");
                };
                let id = list.todos.iter().map(|t| t.id).max().unwrap_or(0) + 1;
                list.todos.push(TodoItem {
                    id,
                    task: task.clone(),
                    status: TodoStatus::Pending,
                    created_at: Utc::now().to_rfc3339(),
                });
                ("Todo added".to_string(), format!("Added task [{}]: {}", id, task))
            }
            Operation::Update => {
                let id = input.task_id("update")?;
                let Some(status) = input.status else {
                    bail!("status is required for update");
                };
                let item = list.find(id)?;
                let old = item.status;
                item.status = status;
                (
                    "Todo updated".to_string(),
                    format!("Task [{}] {}: {} -> {}", id, item.task, old, status),
                )
            }
            Operation::Complete => {
                let id = input.task_id("complete")?;
                let item = list.find(id)?;
                item.status = TodoStatus::Completed;
                ("Todo completed".to_string(), format!("Completed task [{}]: {}", id, item.task))
            }
            Operation::Remove => {
                let id = input.task_id("remove")?;
                let task = list.find(id)?.task.clone();
                list.todos.retain(|t| t.id != id);
                ("Todo removed".to_string(), format!("Removed task [{}]: {}", id, task))
            }
            Operation::Clear => {
                let cleared = list.todos.len();
                list.todos.clear();
                ("Todos cleared".to_string(), format!("Cleared {} todo(s)", cleared))
            }
        };

        self.save(&ctx.session_id, &mut list)?;
        Ok(ToolResult::success(title, output))
    }
}
