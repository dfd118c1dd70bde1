//! Agent policies.
//!
//! An [`AgentConfig`] is an immutable declaration of what one agent may do:
//! which tools are enabled, and whether file edits, shell commands and web
//! fetches are allowed, denied, or need confirmation. The runner reads it;
//! nothing mutates it during a run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::constants::MAX_ITERATIONS_DEFAULT;
use crate::permissions::Permission;

/// Tools that modify files and fall under the edit permission.
const EDIT_TOOLS: &[&str] = &["write_file", "edit", "multiedit"];

/// One row of the bash permission table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BashRule {
    /// Glob over the whole command line; `*` matches any run of characters.
    pub pattern: String,
    pub permission: Permission,
}

impl BashRule {
    pub fn new(pattern: &str, permission: Permission) -> Self {
        Self {
            pattern: pattern.to_string(),
            permission,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    /// System prompt sent with every provider call.
    pub prompt: String,
    /// Tool name → enabled. `*` sets the default for unlisted tools;
    /// with no entry at all a tool is enabled.
    pub tools: BTreeMap<String, bool>,
    pub edit: Permission,
    /// Ordered bash permission table.
    pub bash: Vec<BashRule>,
    pub webfetch: Permission,
    pub max_iterations: usize,
}

impl AgentConfig {
    /// Full-access development agent.
    pub fn build() -> Self {
        Self {
            name: "build".into(),
            description: "Full-access development agent".into(),
            prompt: BUILD_PROMPT.into(),
            tools: BTreeMap::new(),
            edit: Permission::Allow,
            bash: vec![BashRule::new("*", Permission::Allow)],
            webfetch: Permission::Allow,
            max_iterations: MAX_ITERATIONS_DEFAULT,
        }
    }

    /// Read-only exploration agent.
    pub fn plan() -> Self {
        let read_only = [
            "cat *",
            "ls *",
            "grep *",
            "find *",
            "git diff*",
            "git log*",
            "git status*",
            "head *",
            "tail *",
            "wc *",
            "tree *",
        ];
        let mut bash: Vec<BashRule> = read_only
            .iter()
            .map(|p| BashRule::new(p, Permission::Allow))
            .collect();
        bash.push(BashRule::new("*", Permission::Ask));

        let mut tools = BTreeMap::new();
        for tool in EDIT_TOOLS {
            tools.insert((*tool).to_string(), false);
        }

        Self {
            name: "plan".into(),
            description: "Read-only code exploration agent".into(),
            prompt: PLAN_PROMPT.into(),
            tools,
            edit: Permission::Deny,
            bash,
            webfetch: Permission::Allow,
            max_iterations: MAX_ITERATIONS_DEFAULT,
        }
    }

    /// The built-in agents, in display order.
    pub fn builtins() -> Vec<Self> {
        vec![Self::build(), Self::plan()]
    }

    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        self.tools
            .get(tool)
            .or_else(|| self.tools.get("*"))
            .copied()
            .unwrap_or(true)
    }

    /// Resolves the permission for calling `tool` with `args`.
    pub fn check(&self, tool: &str, args: &Value) -> Permission {
        if !self.is_tool_enabled(tool) {
            return Permission::Deny;
        }
        match tool {
            t if EDIT_TOOLS.contains(&t) => self.edit,
            "bash" => match args.get("command").and_then(Value::as_str) {
                Some(command) => self.bash_permission(command),
                None => Permission::Deny,
            },
            "webfetch" => self.webfetch,
            _ => Permission::Allow,
        }
    }

    /// The most specific (longest) matching pattern decides; the earlier rule
    /// wins a tie. No match denies.
    pub fn bash_permission(&self, command: &str) -> Permission {
        let command = command.trim();
        let mut best: Option<&BashRule> = None;
        for rule in &self.bash {
            let matches = match glob::Pattern::new(&rule.pattern) {
                Ok(p) => p.matches(command),
                Err(e) => {
                    tracing::warn!(pattern = %rule.pattern, error = %e, "invalid bash permission pattern");
                    false
                }
            };
            if matches && best.is_none_or(|b| rule.pattern.len() > b.pattern.len()) {
                best = Some(rule);
            }
        }
        best.map(|r| r.permission).unwrap_or(Permission::Deny)
    }
}

const BUILD_PROMPT: &str = "You are kiri, an AI coding assistant with full access to the project in \
your working directory. You can read, write and edit files, search code, run shell commands and \
fetch web pages through your tools.

When working on a task:
1. Read the relevant files before changing anything.
2. Make targeted, precise changes.
3. Run the project's tests or build when that is possible.
4. Finish with a short explanation of what you changed.";

const PLAN_PROMPT: &str = "You are kiri in planning mode: a read-only code exploration assistant. \
Explore the codebase, answer questions about its structure and behavior, find problems and plan \
implementation approaches.

You cannot edit or create files. Use read-only tools (read_file, ls, glob, grep) and read-only \
shell commands. Suggest changes, do not make them.";
