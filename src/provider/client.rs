//! rig-core backed implementation of [`LlmProvider`].
//!
//! Contains the [`RigProvider`] struct which wraps rig-core provider clients
//! behind enum dispatch. Each call is a single streamed completion: rig never
//! executes tools here, the runner does.

use anyhow::{Context, Result};
use futures::StreamExt;
use rig::client::CompletionClient;
use rig::completion::{CompletionModel, Prompt, ToolDefinition as RigToolDefinition};
use rig::message::{
    AssistantContent, Message as RigMessage, Text, ToolCall as RigToolCall, ToolFunction,
};
use rig::providers::{anthropic, openai, openrouter};
use rig::streaming::StreamedAssistantContent;
use rig::OneOrMany;

use super::kind::ProviderKind;
use super::resolve::ModelSelection;
use super::{
    AssistantBlock, ContextMessage, EventStream, LlmProvider, ProviderEvent, ProviderRequest,
    StopReason, Summarizer,
};
use crate::config::Config;
use crate::error::ProviderError;

/// Internal enum wrapping provider-specific clients.
enum ClientKind {
    Anthropic(anthropic::Client),
    OpenAI(openai::Client),
    OpenRouter(openrouter::Client),
    Ollama(openai::Client),
}

/// A configured LLM provider ready to handle completion requests.
///
/// Wraps a rig-core provider client and the target model name.
pub struct RigProvider {
    client: ClientKind,
    kind: ProviderKind,
    model: String,
}

/// Dispatches an operation across provider-specific clients.
///
/// Matches on [`ClientKind`] and executes the same block for each variant,
/// letting the compiler monomorphize per provider.
macro_rules! dispatch {
    ($self:expr, |$client:ident| $body:expr) => {
        match &$self.client {
            ClientKind::Anthropic($client) => $body,
            ClientKind::OpenAI($client) => $body,
            ClientKind::OpenRouter($client) => $body,
            ClientKind::Ollama($client) => $body,
        }
    };
}

/// Turns a rig streaming response into kiri's [`EventStream`].
///
/// Text and complete tool calls are forwarded; deltas, reasoning and the
/// final aggregate are dropped. A `Stop` event closes every successful stream,
/// with `ToolUse` when at least one tool call was seen.
macro_rules! into_events {
    ($response:expr) => {{
        futures::stream::unfold(Some(($response, false)), |state| async move {
            let (mut response, mut saw_tool_call) = state?;
            loop {
                match response.next().await {
                    Some(Ok(StreamedAssistantContent::Text(Text { text }))) => {
                        return Some((
                            Ok(ProviderEvent::TextDelta(text)),
                            Some((response, saw_tool_call)),
                        ));
                    }
                    Some(Ok(StreamedAssistantContent::ToolCall { tool_call, .. })) => {
                        saw_tool_call = true;
                        let event = ProviderEvent::ToolCall {
                            id: tool_call.id,
                            name: tool_call.function.name,
                            args: tool_call.function.arguments,
                        };
                        return Some((Ok(event), Some((response, saw_tool_call))));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        return Some((Err(ProviderError::Transport(err.to_string())), None));
                    }
                    None => {
                        let reason = if saw_tool_call {
                            StopReason::ToolUse
                        } else {
                            StopReason::EndTurn
                        };
                        return Some((Ok(ProviderEvent::Stop(reason)), None));
                    }
                }
            }
        })
        .boxed()
    }};
}

impl RigProvider {
    /// Creates a new [`RigProvider`] from the loaded application config.
    ///
    /// Resolves the API key through kiri's config precedence chain
    /// (env var → config file → substitution) and builds the appropriate
    /// provider client.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is found for the selected provider
    /// or if client construction fails.
    pub fn from_config(config: &Config, selection: &ModelSelection) -> Result<Self> {
        let client = match selection.provider {
            ProviderKind::Anthropic => {
                let api_key = config
                    .resolve_api_key("anthropic")
                    .context("No API key found for Anthropic. Set ANTHROPIC_API_KEY or configure it in config.toml")?;
                ClientKind::Anthropic(
                    anthropic::Client::new(&api_key)
                        .context("Failed to create Anthropic client")?,
                )
            }
            ProviderKind::OpenAI => {
                let api_key = config
                    .resolve_api_key("openai")
                    .context("No API key found for OpenAI. Set OPENAI_API_KEY or configure it in config.toml")?;
                ClientKind::OpenAI(
                    openai::Client::new(&api_key).context("Failed to create OpenAI client")?,
                )
            }
            ProviderKind::OpenRouter => {
                let api_key = config
                    .resolve_api_key("openrouter")
                    .context("No API key found for OpenRouter. Set OPENROUTER_API_KEY or configure it in config.toml")?;
                ClientKind::OpenRouter(
                    openrouter::Client::new(&api_key)
                        .context("Failed to create OpenRouter client")?,
                )
            }
            ProviderKind::Ollama => {
                let base_url = config
                    .provider
                    .ollama
                    .as_ref()
                    .and_then(|o| o.base_url.as_deref())
                    .unwrap_or(crate::constants::OLLAMA_DEFAULT_BASE_URL);
                ClientKind::Ollama(
                    openai::Client::builder()
                        .api_key("ollama")
                        .base_url(format!("{}/v1", base_url))
                        .build()
                        .context("Failed to create Ollama client")?,
                )
            }
        };

        Ok(Self {
            client,
            kind: selection.provider,
            model: selection.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends a non-streaming prompt to the LLM and returns the full response.
    ///
    /// Used for internal tasks like summarizing pruned context where
    /// streaming output is not needed.
    pub async fn prompt(&self, prompt_text: &str) -> Result<String> {
        dispatch!(self, |client| {
            let agent = client
                .agent(&self.model)
                .max_tokens(crate::constants::MAX_TOKENS)
                .build();
            Ok(agent.prompt(prompt_text).await?)
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for RigProvider {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn stream(&self, request: ProviderRequest<'_>) -> Result<EventStream, ProviderError> {
        let (prompt, history) = split_prompt(request.messages)?;
        let tools: Vec<RigToolDefinition> = request
            .tools
            .iter()
            .map(|t| RigToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect();
        let system = request.system.map(str::to_string);

        dispatch!(self, |client| {
            let model = client.completion_model(&self.model);
            let mut builder = model
                .completion_request(prompt.clone())
                .messages(history.clone())
                .tools(tools.clone())
                .max_tokens(crate::constants::MAX_TOKENS);
            if let Some(ref system) = system {
                builder = builder.preamble(system.clone());
            }
            let response = builder
                .stream()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?;
            Ok(into_events!(response))
        })
    }
}

#[async_trait::async_trait]
impl Summarizer for RigProvider {
    async fn summarize(&self, transcript: &str) -> Result<String> {
        let prompt_text = format!("{}{}", crate::constants::SUMMARY_PROMPT, transcript);
        self.prompt(&prompt_text)
            .await
            .context("Failed to generate context summary")
    }
}

/// Splits the context into rig's (prompt, history) pair: the newest message
/// is the prompt, everything before it is chat history.
fn split_prompt(messages: &[ContextMessage]) -> Result<(RigMessage, Vec<RigMessage>), ProviderError> {
    let (last, rest) = messages
        .split_last()
        .ok_or_else(|| ProviderError::Malformed("empty context".into()))?;
    Ok((to_rig(last), rest.iter().map(to_rig).collect()))
}

/// Converts a [`ContextMessage`] to a rig-core [`RigMessage`].
///
/// - **User** → `RigMessage::User` with text content
/// - **Assistant** (text only) → `RigMessage::Assistant` with text content
/// - **Assistant** (with tool calls) → `RigMessage::Assistant` with `ToolCall` content items
/// - **ToolResult** → `RigMessage::User` with `ToolResult` content
fn to_rig(msg: &ContextMessage) -> RigMessage {
    match msg {
        ContextMessage::User(text) => RigMessage::user(text.clone()),
        ContextMessage::Assistant(blocks) => {
            let has_calls = blocks
                .iter()
                .any(|b| matches!(b, AssistantBlock::ToolCall { .. }));
            if !has_calls {
                let text = blocks
                    .iter()
                    .filter_map(|b| match b {
                        AssistantBlock::Text(t) => Some(t.as_str()),
                        AssistantBlock::ToolCall { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                return RigMessage::assistant(text);
            }
            let items: Vec<AssistantContent> = blocks
                .iter()
                .filter_map(|b| match b {
                    AssistantBlock::Text(t) if t.is_empty() => None,
                    AssistantBlock::Text(t) => Some(AssistantContent::Text(Text { text: t.clone() })),
                    AssistantBlock::ToolCall { id, name, args } => {
                        Some(AssistantContent::ToolCall(RigToolCall::new(
                            id.clone(),
                            ToolFunction::new(name.clone(), args.clone()),
                        )))
                    }
                })
                .collect();
            RigMessage::Assistant {
                id: None,
                content: OneOrMany::many(items)
                    .unwrap_or_else(|_| OneOrMany::one(AssistantContent::text(""))),
            }
        }
        ContextMessage::ToolResult {
            call_id, content, ..
        } => RigMessage::tool_result(call_id.clone(), content.clone()),
    }
}
