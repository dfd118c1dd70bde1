//! File loading and merging for kiri configuration.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::types::{default_model, AgentOverride, Config, ProviderEntry, RuntimeConfig};

impl Config {
    /// Loads the global config from `~/.config/kiri/config.toml`.
    ///
    /// If no config file exists, creates one with sensible defaults
    /// (including `{env:VAR}` placeholders for API keys) and returns it.
    pub(super) fn load_global() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            let default_toml = format!(
                r#"model = "{}"
default_agent = "build"

[provider]

[provider.anthropic]
api_key = "{{env:ANTHROPIC_API_KEY}}"

[provider.openai]
api_key = "{{env:OPENAI_API_KEY}}"

[provider.openrouter]
api_key = "{{env:OPENROUTER_API_KEY}}"

[provider.ollama]
base_url = "http://localhost:11434"

[runtime]
max_iterations = 50
doom_loop_detection = true
doom_loop_threshold = 3
context_window_tokens = 100000
retry_attempts = 4
"#,
                default_model()
            );
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &default_toml)
                .with_context(|| format!("Failed to write default config to {:?}", path))?;
            return Self::parse(&default_toml, &path);
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        Self::parse(&contents, &path)
    }

    /// Look for kiri.toml in `start`, then walk up to the git root.
    pub(super) fn load_project_from(start: &Path) -> Result<Option<Config>> {
        let Some(path) = Self::find_project_file(start) else {
            return Ok(None);
        };
        debug!(path = %path.display(), "loading project config");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        Ok(Some(Self::parse(&contents, &path)?))
    }

    fn find_project_file(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(crate::constants::PROJECT_CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            // Stop at git root or filesystem root
            if dir.join(".git").exists() || !dir.pop() {
                return None;
            }
        }
    }

    pub(super) fn parse(contents: &str, path: &Path) -> Result<Self> {
        toml::from_str(contents).with_context(|| format!("Failed to parse config at {:?}", path))
    }

    /// Merge project config over global config.
    /// Project values win when present.
    pub(super) fn merge(global: Config, project: Config) -> Config {
        let mut agents = global.agents;
        for (name, over) in project.agents {
            let merged = match agents.remove(&name) {
                Some(base) => merge_agent(base, over),
                None => over,
            };
            agents.insert(name, merged);
        }

        Config {
            model: if project.model != default_model() {
                project.model
            } else {
                global.model
            },
            provider: super::types::ProviderConfig {
                openai: merge_entry(global.provider.openai, project.provider.openai),
                anthropic: merge_entry(global.provider.anthropic, project.provider.anthropic),
                ollama: merge_entry(global.provider.ollama, project.provider.ollama),
                openrouter: merge_entry(global.provider.openrouter, project.provider.openrouter),
            },
            system_prompt: project.system_prompt.or(global.system_prompt),
            default_provider: project.default_provider.or(global.default_provider),
            default_agent: project.default_agent.or(global.default_agent),
            runtime: RuntimeConfig {
                max_iterations: project.runtime.max_iterations.or(global.runtime.max_iterations),
                doom_loop_detection: project
                    .runtime
                    .doom_loop_detection
                    .or(global.runtime.doom_loop_detection),
                doom_loop_threshold: project
                    .runtime
                    .doom_loop_threshold
                    .or(global.runtime.doom_loop_threshold),
                context_window_tokens: project
                    .runtime
                    .context_window_tokens
                    .or(global.runtime.context_window_tokens),
                max_conversation_messages: project
                    .runtime
                    .max_conversation_messages
                    .or(global.runtime.max_conversation_messages),
                token_estimator: project
                    .runtime
                    .token_estimator
                    .or(global.runtime.token_estimator),
                summarize_pruned: project
                    .runtime
                    .summarize_pruned
                    .or(global.runtime.summarize_pruned),
                auto_approve: project.runtime.auto_approve.or(global.runtime.auto_approve),
                retry_attempts: project.runtime.retry_attempts.or(global.runtime.retry_attempts),
                retry_initial_delay_ms: project
                    .runtime
                    .retry_initial_delay_ms
                    .or(global.runtime.retry_initial_delay_ms),
                retry_max_delay_ms: project
                    .runtime
                    .retry_max_delay_ms
                    .or(global.runtime.retry_max_delay_ms),
            },
            agents,
        }
    }
}

fn merge_entry(global: Option<ProviderEntry>, project: Option<ProviderEntry>) -> Option<ProviderEntry> {
    match (global, project) {
        (Some(g), Some(p)) => Some(ProviderEntry {
            api_key: p.api_key.or(g.api_key),
            base_url: p.base_url.or(g.base_url),
            model: p.model.or(g.model),
        }),
        (g, p) => p.or(g),
    }
}

fn merge_agent(global: AgentOverride, project: AgentOverride) -> AgentOverride {
    AgentOverride {
        description: project.description.or(global.description),
        prompt: project.prompt.or(global.prompt),
        tools: project.tools.or(global.tools),
        edit: project.edit.or(global.edit),
        bash: project.bash.or(global.bash),
        webfetch: project.webfetch.or(global.webfetch),
        max_iterations: project.max_iterations.or(global.max_iterations),
    }
}
