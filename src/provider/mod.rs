//! LLM provider abstraction for kiri.
//!
//! The runner only sees [`LlmProvider`]: a request goes in, a pull-based
//! stream of [`ProviderEvent`]s comes out. [`RigProvider`] implements it over
//! rig-core clients (Anthropic, OpenAI, OpenRouter, Ollama) with enum dispatch,
//! keeping vendor request shaping out of the loop.

mod client;
mod kind;
mod resolve;

pub use client::RigProvider;
pub use resolve::{resolve_model, ModelSelection};

use std::time::Duration;

use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use crate::constants::{
    PROVIDER_RETRY_ATTEMPTS_DEFAULT, PROVIDER_RETRY_INITIAL_DELAY_MS_DEFAULT,
    PROVIDER_RETRY_MAX_DELAY_MS_DEFAULT,
};
use crate::error::ProviderError;

/// Definition sent to the LLM so it knows what a tool accepts.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON Schema
}

/// One block of an assistant turn, in the order the model produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantBlock {
    Text(String),
    ToolCall { id: String, name: String, args: Value },
}

/// A message in the provider-facing shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextMessage {
    /// A user turn collapsed into a single content block.
    User(String),
    /// Interleaved text and tool-call blocks.
    Assistant(Vec<AssistantBlock>),
    /// Follow-up block answering the tool call with `call_id`.
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
}

/// Everything one provider call needs.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    pub system: Option<&'a str>,
    pub messages: &'a [ContextMessage],
    pub tools: &'a [ToolDefinition],
}

/// Why the model stopped producing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The model finished its answer.
    EndTurn,
    /// The model wants tool results before continuing.
    ToolUse,
    /// The output hit the token cap.
    MaxTokens,
}

/// One event of a streamed model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    TextDelta(String),
    ToolCall { id: String, name: String, args: Value },
    Stop(StopReason),
}

/// Pull-based stream of provider events.
pub type EventStream = BoxStream<'static, Result<ProviderEvent, ProviderError>>;

/// A streaming LLM backend.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Starts a completion for `request` and returns its event stream.
    ///
    /// Text deltas arrive in order; all events of one response precede its
    /// `Stop` event.
    async fn stream(&self, request: ProviderRequest<'_>) -> Result<EventStream, ProviderError>;
}

/// Condenses a transcript into a short summary (used when pruning context).
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> anyhow::Result<String>;
}

/// Exponential backoff for opening a provider stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first included. `1` disables retries.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: PROVIDER_RETRY_ATTEMPTS_DEFAULT,
            initial_delay: Duration::from_millis(PROVIDER_RETRY_INITIAL_DELAY_MS_DEFAULT),
            max_delay: Duration::from_millis(PROVIDER_RETRY_MAX_DELAY_MS_DEFAULT),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}
