use super::*;
use serde_json::json;
use std::fs;

/// Fresh working directory for one test.
fn workdir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kiri_tools_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn ctx(dir: &Path) -> ToolContext {
    ToolContext {
        session_id: "test-session".into(),
        message_id: MessageId(1),
        call_id: "call_1".into(),
        agent: "build".into(),
        working_dir: dir.to_path_buf(),
        cancel: CancellationToken::new(),
    }
}

#[test]
fn test_registry_with_builtins() {
    let registry = ToolRegistry::with_builtins();
    assert_eq!(registry.len(), 9);
    assert!(!registry.is_empty());
    assert_eq!(
        registry.names(),
        vec![
            "bash",
            "edit",
            "glob",
            "grep",
            "ls",
            "multiedit",
            "read_file",
            "webfetch",
            "write_file"
        ]
    );
}

#[test]
fn test_registry_with_storage_adds_todo() {
    let dir = workdir("with_storage");
    let registry = ToolRegistry::with_storage(Storage::open(dir.join("store")).unwrap());
    assert_eq!(registry.len(), 10);
    assert!(registry.get("todo").is_some());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_definitions_follow_agent_tool_set() {
    let registry = ToolRegistry::with_builtins();
    let build: Vec<String> = registry
        .definitions_for(&AgentConfig::build())
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(build, registry.names());

    let plan: Vec<String> = registry
        .definitions_for(&AgentConfig::plan())
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert!(!plan.contains(&"write_file".to_string()));
    assert!(!plan.contains(&"edit".to_string()));
    assert!(!plan.contains(&"multiedit".to_string()));
    assert!(plan.contains(&"read_file".to_string()));
}

#[test]
fn test_register_overwrites_and_unregister() {
    let mut registry = ToolRegistry::new();
    assert!(registry.register(Arc::new(ls_tool::LsTool)).is_none());
    assert!(registry.register(Arc::new(ls_tool::LsTool)).is_some());
    assert_eq!(registry.len(), 1);
    assert!(registry.get("ls").is_some());
    assert!(registry.unregister("ls").is_some());
    assert!(registry.get("ls").is_none());
}

#[tokio::test]
async fn test_unknown_tool_is_an_error_result() {
    let dir = workdir("unknown");
    let registry = ToolRegistry::with_builtins();
    let result = registry.execute("teleport", json!({}), &ctx(&dir)).await;
    assert_eq!(result.error.as_deref(), Some("Unknown tool: teleport"));
    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_missing_required_argument_never_raises() {
    let dir = workdir("missing_arg");
    let registry = ToolRegistry::with_builtins();
    let result = registry.execute("read_file", json!({}), &ctx(&dir)).await;
    assert!(result.is_error());
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("Missing required parameter: path"));
    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_read_file_with_offset_and_limit() {
    let dir = workdir("read");
    fs::write(dir.join("notes.txt"), "one\ntwo\nthree\nfour\n").unwrap();
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .execute("read_file", json!({"path": "notes.txt"}), &ctx(&dir))
        .await;
    assert!(!result.is_error());
    assert!(result.output.contains("     1\tone"));
    assert!(result.output.contains("     4\tfour"));

    let result = registry
        .execute(
            "read_file",
            json!({"path": "notes.txt", "offset": 2, "limit": 2}),
            &ctx(&dir),
        )
        .await;
    assert!(result.output.starts_with("     2\ttwo\n     3\tthree"));
    assert!(result.output.contains("showing lines 2-3 of 4"));
    assert_eq!(result.metadata["lines"], 2);

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_read_file_nonexistent_and_escape() {
    let dir = workdir("read_err");
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .execute("read_file", json!({"path": "nope.txt"}), &ctx(&dir))
        .await;
    assert!(result.is_error());

    fs::write(std::env::temp_dir().join("kiri_outside.txt"), "secret").unwrap();
    let result = registry
        .execute("read_file", json!({"path": "../kiri_outside.txt"}), &ctx(&dir))
        .await;
    assert!(result.error.as_deref().unwrap().contains("escapes"));

    fs::remove_file(std::env::temp_dir().join("kiri_outside.txt")).unwrap();
    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_read_file_binary() {
    let dir = workdir("binary");
    fs::write(dir.join("blob.bin"), [0u8, 1, 2, 3]).unwrap();
    let registry = ToolRegistry::with_builtins();
    let result = registry
        .execute("read_file", json!({"path": "blob.bin"}), &ctx(&dir))
        .await;
    assert!(result.error.as_deref().unwrap().contains("Binary"));
    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_write_then_read_sees_effect() {
    let dir = workdir("write_read");
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .execute(
            "write_file",
            json!({"path": "nested/dir/hello.txt", "content": "hello"}),
            &ctx(&dir),
        )
        .await;
    assert!(!result.is_error(), "{:?}", result.error);
    assert_eq!(result.metadata["created"], true);

    let result = registry
        .execute("read_file", json!({"path": "nested/dir/hello.txt"}), &ctx(&dir))
        .await;
    assert!(result.output.contains("hello"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_write_file_path_escape() {
    let dir = workdir("write_escape");
    let registry = ToolRegistry::with_builtins();
    let result = registry
        .execute(
            "write_file",
            json!({"path": "../kiri_escape_dir/x.txt", "content": "x"}),
            &ctx(&dir),
        )
        .await;
    assert!(result.is_error());
    assert!(!std::env::temp_dir().join("kiri_escape_dir").exists());
    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_edit_replace_first_and_all() {
    let dir = workdir("edit");
    fs::write(dir.join("a.rs"), "let x = 1;\nlet y = 1;\n").unwrap();
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .execute(
            "edit",
            json!({"path": "a.rs", "old_text": "1", "new_text": "2"}),
            &ctx(&dir),
        )
        .await;
    assert!(!result.is_error());
    assert!(result.output.contains("+let x = 2;"));
    assert_eq!(fs::read_to_string(dir.join("a.rs")).unwrap(), "let x = 2;\nlet y = 1;\n");

    let result = registry
        .execute(
            "edit",
            json!({"path": "a.rs", "old_text": "let", "new_text": "const", "replace_all": true}),
            &ctx(&dir),
        )
        .await;
    assert_eq!(result.metadata["replacements"], 2);
    assert_eq!(fs::read_to_string(dir.join("a.rs")).unwrap(), "const x = 2;\nconst y = 1;\n");

    let result = registry
        .execute(
            "edit",
            json!({"path": "a.rs", "old_text": "missing", "new_text": "x"}),
            &ctx(&dir),
        )
        .await;
    assert!(result.error.as_deref().unwrap().contains("Text not found"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_ls_directories_first() {
    let dir = workdir("ls");
    fs::create_dir_all(dir.join("src")).unwrap();
    fs::write(dir.join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(dir.join("Cargo.toml"), "[package]").unwrap();
    fs::write(dir.join(".hidden"), "").unwrap();
    let registry = ToolRegistry::with_builtins();

    let result = registry.execute("ls", json!({}), &ctx(&dir)).await;
    assert!(!result.is_error());
    let lines: Vec<&str> = result.output.lines().collect();
    assert_eq!(lines[0], "src/");
    assert!(lines.iter().any(|l| l.starts_with("Cargo.toml")));
    assert!(lines.iter().any(|l| l.starts_with(".hidden")));
    assert_eq!(result.metadata["count"], 3);

    let result = registry
        .execute("ls", json!({"show_hidden": false, "recursive": true}), &ctx(&dir))
        .await;
    assert!(!result.output.contains(".hidden"));
    assert!(result.output.contains("  main.rs"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_glob_and_grep() {
    let dir = workdir("search");
    fs::create_dir_all(dir.join("src")).unwrap();
    fs::write(dir.join("src/lib.rs"), "pub fn answer() -> u32 {\n    42\n}\n").unwrap();
    fs::write(dir.join("README.md"), "answer: 42\n").unwrap();
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .execute("glob", json!({"pattern": "src/**/*.rs"}), &ctx(&dir))
        .await;
    assert_eq!(result.output, "src/lib.rs");

    let result = registry
        .execute("glob", json!({"pattern": "*.py"}), &ctx(&dir))
        .await;
    assert_eq!(result.output, "No files matched the pattern.");

    let result = registry
        .execute("grep", json!({"pattern": "answer", "include": "*.rs"}), &ctx(&dir))
        .await;
    assert_eq!(result.output, "src/lib.rs:1:pub fn answer() -> u32 {");

    let result = registry
        .execute("grep", json!({"pattern": "("}), &ctx(&dir))
        .await;
    assert!(result.error.as_deref().unwrap().contains("Invalid regex"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_bash_runs_in_working_dir() {
    let dir = workdir("bash");
    fs::write(dir.join("marker.txt"), "").unwrap();
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .execute("bash", json!({"command": "ls"}), &ctx(&dir))
        .await;
    assert!(!result.is_error());
    assert_eq!(result.output, "marker.txt");
    assert_eq!(result.metadata["exit_code"], 0);

    let result = registry
        .execute("bash", json!({"command": "echo oops >&2; exit 3"}), &ctx(&dir))
        .await;
    assert_eq!(result.error.as_deref(), Some("Exit code: 3"));
    assert!(result.output.contains("oops"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_bash_timeout_and_cancel() {
    let dir = workdir("bash_slow");
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .execute("bash", json!({"command": "sleep 5", "timeout": 1}), &ctx(&dir))
        .await;
    assert_eq!(result.error.as_deref(), Some("Command timed out after 1s"));

    let context = ctx(&dir);
    context.cancel.cancel();
    let result = registry
        .execute("bash", json!({"command": "sleep 5"}), &context)
        .await;
    assert_eq!(result.error.as_deref(), Some("Command cancelled"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_webfetch_rejects_non_http_url() {
    let dir = workdir("webfetch");
    let registry = ToolRegistry::with_builtins();
    let result = registry
        .execute("webfetch", json!({"url": "file:///etc/passwd"}), &ctx(&dir))
        .await;
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("does not match required pattern"));
    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_multiedit_applies_across_files_in_order() {
    let dir = workdir("multiedit");
    fs::write(dir.join("a.rs"), "fn old() {}\nold();\n").unwrap();
    fs::write(dir.join("b.rs"), "use a::old;\n").unwrap();
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .execute(
            "multiedit",
            json!({"edits": [
                {"path": "a.rs", "old_text": "old", "new_text": "new", "replace_all": true},
                {"path": "a.rs", "old_text": "new();", "new_text": "new(); // call"},
                {"path": "b.rs", "old_text": "old", "new_text": "new"}
            ]}),
            &ctx(&dir),
        )
        .await;
    assert!(!result.is_error(), "{:?}", result.error);
    assert_eq!(result.metadata["replacements"], 4);
    assert_eq!(result.metadata["files"], json!(["a.rs", "b.rs"]));
    assert!(result.output.contains("+use a::new;"));
    assert_eq!(
        fs::read_to_string(dir.join("a.rs")).unwrap(),
        "fn new() {}\nnew(); // call\n"
    );
    assert_eq!(fs::read_to_string(dir.join("b.rs")).unwrap(), "use a::new;\n");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_multiedit_failure_leaves_files_untouched() {
    let dir = workdir("multiedit_fail");
    fs::write(dir.join("a.rs"), "let x = 1;\n").unwrap();
    fs::write(dir.join("b.rs"), "let y = 2;\n").unwrap();
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .execute(
            "multiedit",
            json!({"edits": [
                {"path": "a.rs", "old_text": "1", "new_text": "10"},
                {"path": "b.rs", "old_text": "missing", "new_text": "z"}
            ]}),
            &ctx(&dir),
        )
        .await;
    assert_eq!(
        result.error.as_deref(),
        Some("Edit 2 failed: text not found in b.rs. No files were modified.")
    );
    assert_eq!(fs::read_to_string(dir.join("a.rs")).unwrap(), "let x = 1;\n");
    assert_eq!(fs::read_to_string(dir.join("b.rs")).unwrap(), "let y = 2;\n");

    let result = registry
        .execute("multiedit", json!({"edits": []}), &ctx(&dir))
        .await;
    assert_eq!(result.error.as_deref(), Some("No edits provided"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_multiedit_dry_run_writes_nothing() {
    let dir = workdir("multiedit_dry");
    fs::write(dir.join("a.rs"), "let x = 1;\n").unwrap();
    let registry = ToolRegistry::with_builtins();

    let result = registry
        .execute(
            "multiedit",
            json!({
                "edits": [{"path": "a.rs", "old_text": "1", "new_text": "2"}],
                "dry_run": true
            }),
            &ctx(&dir),
        )
        .await;
    assert!(!result.is_error());
    assert_eq!(result.metadata["dry_run"], true);
    assert!(result.output.starts_with("Dry run: 1 file(s), 1 replacement(s)"));
    assert!(result.output.contains("+let x = 2;"));
    assert!(result.output.ends_with("No files were modified."));
    assert_eq!(fs::read_to_string(dir.join("a.rs")).unwrap(), "let x = 1;\n");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_multiedit_path_escape() {
    let dir = workdir("multiedit_escape");
    let registry = ToolRegistry::with_builtins();
    let result = registry
        .execute(
            "multiedit",
            json!({"edits": [{"path": "../outside.rs", "old_text": "a", "new_text": "b"}]}),
            &ctx(&dir),
        )
        .await;
    assert!(result.is_error());
    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_todo_lifecycle() {
    let dir = workdir("todo");
    let registry = ToolRegistry::with_storage(Storage::open(dir.join("store")).unwrap());
    let ctx = ctx(&dir);

    let result = registry.execute("todo", json!({"operation": "list"}), &ctx).await;
    assert_eq!(result.output, "No todos");
    assert_eq!(result.metadata["total"], 0);

    for task in ["write parser", "add tests"] {
        let result = registry
            .execute("todo", json!({"operation": "add", "task": task}), &ctx)
            .await;
        assert!(!result.is_error());
    }

    let result = registry
        .execute(
            "todo",
            json!({"operation": "update", "task_id": 1, "status": "in_progress"}),
            &ctx,
        )
        .await;
    assert_eq!(result.output, "Task [1] write parser: pending -> in_progress");

    let result = registry
        .execute("todo", json!({"operation": "complete", "task_id": 2}), &ctx)
        .await;
    assert_eq!(result.output, "Completed task [2]: add tests");

    let result = registry.execute("todo", json!({"operation": "list"}), &ctx).await;
    assert_eq!(result.metadata["total"], 2);
    assert_eq!(result.metadata["in_progress"], 1);
    assert_eq!(result.metadata["completed"], 1);
    assert!(result.output.contains("In progress:\n  [1] write parser"));

    let result = registry
        .execute("todo", json!({"operation": "remove", "task_id": 1}), &ctx)
        .await;
    assert_eq!(result.output, "Removed task [1]: write parser");

    let result = registry.execute("todo", json!({"operation": "clear"}), &ctx).await;
    assert_eq!(result.output, "Cleared 1 todo(s)");

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_todo_errors() {
    let dir = workdir("todo_errors");
    let registry = ToolRegistry::with_storage(Storage::open(dir.join("store")).unwrap());
    let ctx = ctx(&dir);

    let result = registry
        .execute("todo", json!({"operation": "complete", "task_id": 7}), &ctx)
        .await;
    assert!(result.error.as_deref().unwrap().contains("Task 7 not found"));

    let result = registry.execute("todo", json!({"operation": "remove"}), &ctx).await;
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("task_id is required for remove"));

    let result = registry.execute("todo", json!({"operation": "add"}), &ctx).await;
    assert!(result.is_error());

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_todos_persist_per_session() {
    let dir = workdir("todo_persist");
    let store = dir.join("store");
    let ctx = ctx(&dir);

    let first = ToolRegistry::with_storage(Storage::open(&store).unwrap());
    first
        .execute("todo", json!({"operation": "add", "task": "ship it"}), &ctx)
        .await;

    let second = ToolRegistry::with_storage(Storage::open(&store).unwrap());
    let result = second.execute("todo", json!({"operation": "list"}), &ctx).await;
    assert_eq!(result.metadata["total"], 1);
    assert!(result.output.contains("[1] ship it"));

    let other = ToolContext {
        session_id: "other-session".into(),
        ..ctx.clone()
    };
    let result = second.execute("todo", json!({"operation": "list"}), &other).await;
    assert_eq!(result.metadata["total"], 0);

    fs::remove_dir_all(&dir).unwrap();
}
