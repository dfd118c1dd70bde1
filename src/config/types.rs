//! Struct definitions and serde defaults for kiri configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::agent::BashRule;
use crate::permissions::Permission;
use crate::tokens::EstimatorKind;

/// Root configuration for kiri, deserialized from `config.toml`.
///
/// Fields use serde defaults so kiri can run with sensible defaults
/// when no config file exists.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Default model identifier (e.g. `"claude-sonnet-4-6"`).
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Default provider name (e.g., "anthropic", "openai").
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Extra instructions appended to every agent prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Agent used when `--agent` is not given.
    #[serde(default)]
    pub default_agent: Option<String>,
    /// Loop bounds, context budget and approval settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Overrides of the built-in agents and definitions of new ones.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentOverride>,
}

/// Returns the default model identifier.
///
/// Used by serde's `#[serde(default)]` attribute during deserialization.
pub(super) fn default_model() -> String {
    crate::constants::DEFAULT_MODEL.to_string()
}

/// Provider-specific configuration map.
///
/// Each field corresponds to a supported LLM provider. Only providers
/// the user has configured will be `Some`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderConfig {
    pub openai: Option<ProviderEntry>,
    pub anthropic: Option<ProviderEntry>,
    pub ollama: Option<ProviderEntry>,
    pub openrouter: Option<ProviderEntry>,
}

/// Connection details for a single LLM provider.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderEntry {
    /// API key for authentication. Can also be set via environment variables.
    pub api_key: Option<String>,
    /// Custom base URL for the provider's API (useful for proxies or self-hosted instances).
    pub base_url: Option<String>,
    /// Model identifier to use with this provider, overriding the global default.
    pub model: Option<String>,
}

/// The `[runtime]` table. Unset fields fall back to the constants in
/// [`crate::constants`] through the accessors on [`Config`].
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Upper bound on provider calls per run.
    pub max_iterations: Option<usize>,
    pub doom_loop_detection: Option<bool>,
    /// Identical (or alternating) calls in a row that halt a run.
    pub doom_loop_threshold: Option<usize>,
    /// Token budget for the context sent with each provider call.
    pub context_window_tokens: Option<usize>,
    /// Stored messages loaded at the start of a run.
    pub max_conversation_messages: Option<usize>,
    pub token_estimator: Option<EstimatorKind>,
    /// Summarize messages that fall out of the context window.
    pub summarize_pruned: Option<bool>,
    /// Approve every "ask" decision without prompting.
    pub auto_approve: Option<bool>,
    /// Attempts at opening a provider stream before the run fails.
    pub retry_attempts: Option<u32>,
    pub retry_initial_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
}

/// One `[agents.<name>]` table. Every field is optional; unset fields keep
/// the built-in agent's value (or `build`'s, for a new agent).
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct AgentOverride {
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub tools: Option<BTreeMap<String, bool>>,
    pub edit: Option<Permission>,
    pub bash: Option<Vec<BashRule>>,
    pub webfetch: Option<Permission>,
    pub max_iterations: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            provider: ProviderConfig::default(),
            default_provider: None,
            system_prompt: None,
            default_agent: None,
            runtime: RuntimeConfig::default(),
            agents: BTreeMap::new(),
        }
    }
}
