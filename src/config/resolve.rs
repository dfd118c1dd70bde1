//! Environment variable substitution, API key resolution, runtime defaults
//! and agent resolution.

use std::time::Duration;

use anyhow::{bail, Result};

use super::types::{AgentOverride, Config, ProviderEntry};
use crate::agent::AgentConfig;
use crate::constants::{
    CONTEXT_WINDOW_TOKENS_DEFAULT, DEFAULT_AGENT, DOOM_LOOP_THRESHOLD_DEFAULT,
    MAX_CONVERSATION_MESSAGES_DEFAULT, MAX_ITERATIONS_DEFAULT,
};
use crate::provider::RetryPolicy;
use crate::tokens::EstimatorKind;

impl Config {
    /// Resolve {env:VAR_NAME} patterns in string fields.
    pub(super) fn resolve_substitutions(&mut self) {
        self.model = Self::resolve_str(&self.model);
        if let Some(ref mut sp) = self.system_prompt {
            *sp = Self::resolve_str(sp);
        }
        if let Some(ref mut dp) = self.default_provider {
            *dp = Self::resolve_str(dp);
        }
        Self::resolve_provider_entry(&mut self.provider.openai);
        Self::resolve_provider_entry(&mut self.provider.anthropic);
        Self::resolve_provider_entry(&mut self.provider.ollama);
        Self::resolve_provider_entry(&mut self.provider.openrouter);
        for over in self.agents.values_mut() {
            if let Some(ref mut prompt) = over.prompt {
                *prompt = Self::resolve_str(prompt);
            }
        }
    }

    /// Resolves `{env:VAR}` patterns in a single provider entry's `api_key` and `base_url`.
    fn resolve_provider_entry(entry: &mut Option<ProviderEntry>) {
        if let Some(ref mut e) = entry {
            if let Some(ref mut key) = e.api_key {
                *key = Self::resolve_str(key);
            }
            if let Some(ref mut url) = e.base_url {
                *url = Self::resolve_str(url);
            }
        }
    }

    /// Replace {env:VAR} with the environment variable value.
    fn resolve_str(s: &str) -> String {
        let mut result = s.to_string();
        while let Some(start) = result.find("{env:") {
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 5..start + end];
                let value = std::env::var(var_name).unwrap_or_default();
                result = format!(
                    "{}{}{}",
                    &result[..start],
                    value,
                    &result[start + end + 1..]
                );
            } else {
                break;
            }
        }
        result
    }

    fn provider_entry(&self, provider: &str) -> Option<&ProviderEntry> {
        match provider {
            "openai" => self.provider.openai.as_ref(),
            "anthropic" => self.provider.anthropic.as_ref(),
            "ollama" => self.provider.ollama.as_ref(),
            "openrouter" => self.provider.openrouter.as_ref(),
            _ => None,
        }
    }

    /// Resolve API key for a provider: env var first, then config value.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        // OPENAI_API_KEY, ANTHROPIC_API_KEY, etc.
        let env_key = format!("{}_API_KEY", provider.to_uppercase());
        if let Ok(val) = std::env::var(&env_key) {
            if !val.is_empty() {
                return Some(val);
            }
        }
        self.provider_entry(provider)
            .and_then(|e| e.api_key.clone())
            .filter(|k| !k.is_empty())
    }

    /// Get the configured default provider name, if any.
    pub fn provider_name(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    /// Model configured under `[provider.<name>]`, if any.
    pub fn provider_model(&self, provider: &str) -> Option<String> {
        self.provider_entry(provider).and_then(|e| e.model.clone())
    }

    /// Get the model name from config, stripping provider prefix if present.
    /// Returns None if the model is the compile-time default (meaning user hasn't configured it).
    pub fn model_name(&self) -> Option<String> {
        let m = &self.model;
        if m == crate::constants::DEFAULT_MODEL {
            return None;
        }
        if let Some((_prov, model)) = m.split_once('/') {
            Some(model.to_string())
        } else {
            Some(m.to_string())
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.runtime.max_iterations.unwrap_or(MAX_ITERATIONS_DEFAULT)
    }

    pub fn doom_loop_detection(&self) -> bool {
        self.runtime.doom_loop_detection.unwrap_or(true)
    }

    pub fn doom_loop_threshold(&self) -> usize {
        self.runtime
            .doom_loop_threshold
            .unwrap_or(DOOM_LOOP_THRESHOLD_DEFAULT)
    }

    pub fn context_window_tokens(&self) -> usize {
        self.runtime
            .context_window_tokens
            .unwrap_or(CONTEXT_WINDOW_TOKENS_DEFAULT)
    }

    pub fn max_conversation_messages(&self) -> usize {
        self.runtime
            .max_conversation_messages
            .unwrap_or(MAX_CONVERSATION_MESSAGES_DEFAULT)
    }

    pub fn token_estimator(&self) -> EstimatorKind {
        self.runtime.token_estimator.unwrap_or_default()
    }

    pub fn summarize_pruned(&self) -> bool {
        self.runtime.summarize_pruned.unwrap_or(false)
    }

    pub fn auto_approve(&self) -> bool {
        self.runtime.auto_approve.unwrap_or(false)
    }

    /// Backoff for provider failures; at least one attempt is always made.
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self
                .runtime
                .retry_attempts
                .unwrap_or(defaults.max_attempts)
                .max(1),
            initial_delay: self
                .runtime
                .retry_initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: self
                .runtime
                .retry_max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        }
    }

    /// Agent used when none is named on the command line.
    pub fn default_agent_name(&self) -> &str {
        self.default_agent.as_deref().unwrap_or(DEFAULT_AGENT)
    }

    /// Built-in agents first, then configured ones in name order.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = AgentConfig::builtins().into_iter().map(|a| a.name).collect();
        for name in self.agents.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Resolves an agent by name: the built-in definition (or `build`'s, for
    /// a new agent) with its `[agents.<name>]` overrides applied.
    ///
    /// An agent without its own `max_iterations` takes `[runtime]`'s.
    pub fn agent(&self, name: &str) -> Result<AgentConfig> {
        let builtin = AgentConfig::builtins().into_iter().find(|a| a.name == name);
        let over = self.agents.get(name);
        let mut agent = match (builtin, over) {
            (Some(agent), _) => agent,
            (None, Some(_)) => {
                let mut base = AgentConfig::build();
                base.name = name.to_string();
                base.description = String::new();
                base
            }
            (None, None) => bail!(
                "Unknown agent: {}. Available: {}",
                name,
                self.agent_names().join(", ")
            ),
        };

        agent.max_iterations = self.max_iterations();
        if let Some(over) = over {
            apply_override(&mut agent, over.clone());
        }
        Ok(agent)
    }
}

fn apply_override(agent: &mut AgentConfig, over: AgentOverride) {
    if let Some(description) = over.description {
        agent.description = description;
    }
    if let Some(prompt) = over.prompt {
        agent.prompt = prompt;
    }
    if let Some(tools) = over.tools {
        agent.tools = tools;
    }
    if let Some(edit) = over.edit {
        agent.edit = edit;
    }
    if let Some(bash) = over.bash {
        agent.bash = bash;
    }
    if let Some(webfetch) = over.webfetch {
        agent.webfetch = webfetch;
    }
    if let Some(max) = over.max_iterations {
        agent.max_iterations = max;
    }
}
