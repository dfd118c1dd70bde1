//! Context-window pruning.
//!
//! Before every provider call the runner asks the [`ContextManager`] which
//! messages fit in the token budget. Pruning drops whole messages from the
//! oldest end and never separates a tool call from its result. Dropped
//! messages can be summarized into a note that rides along in the system
//! prompt.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::message::{Message, MessageId, Part, Role};
use crate::provider::Summarizer;
use crate::tokens::TokenEstimator;

/// Output of [`ContextManager::prune`].
#[derive(Debug, Clone, PartialEq)]
pub struct PrunedContext {
    /// Messages to send, oldest first.
    pub messages: Vec<Message>,
    /// Messages that did not fit, oldest first.
    pub dropped: Vec<Message>,
    /// Estimated cost of `messages`.
    pub estimated_tokens: usize,
}

/// Token-budgeted view over a conversation.
#[derive(Debug)]
pub struct ContextManager {
    budget: usize,
    estimator: TokenEstimator,
    /// (dropped count, newest dropped id, summary)
    summary_cache: Option<(usize, MessageId, String)>,
}

impl ContextManager {
    pub fn new(budget: usize, estimator: TokenEstimator) -> Self {
        Self {
            budget,
            estimator,
            summary_cache: None,
        }
    }

    /// Splits `messages` into the window that fits the budget and the rest.
    ///
    /// Walks newest to oldest. The newest user message and everything after
    /// it are always kept, even past the budget, so the current request is
    /// never dropped. The window then starts at its first user turn, and any
    /// tool call or tool result whose partner fell outside it is stripped.
    pub fn prune(&self, messages: &[Message]) -> PrunedContext {
        let pinned = messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .unwrap_or(messages.len().saturating_sub(1));
        let mut total = 0usize;
        let mut cut = messages.len();
        for (i, msg) in messages.iter().enumerate().rev() {
            let cost = self.estimator.count_message(msg);
            if i < pinned && total + cost > self.budget {
                break;
            }
            total += cost;
            cut = i;
        }

        if let Some(offset) = messages[cut..].iter().position(|m| m.role == Role::User) {
            cut += offset;
        }

        let dropped = messages[..cut].to_vec();
        let kept = repair_pairs(&messages[cut..]);
        if !dropped.is_empty() {
            debug!(
                dropped = dropped.len(),
                kept = kept.len(),
                budget = self.budget,
                "pruned context window"
            );
        }
        let estimated_tokens = self.estimator.count_messages(&kept);
        PrunedContext {
            messages: kept,
            dropped,
            estimated_tokens,
        }
    }

    /// Text to append to the system prompt describing what was dropped.
    ///
    /// With a summarizer the dropped messages are summarized (once per
    /// distinct drop set); otherwise, or if summarizing fails, a short
    /// omission note is returned.
    pub async fn pruned_note(
        &mut self,
        dropped: &[Message],
        summarizer: Option<&dyn Summarizer>,
    ) -> Option<String> {
        let newest = dropped.last()?.id;
        let omitted = format!(
            "[{} earlier messages omitted to save context]",
            dropped.len()
        );
        let Some(summarizer) = summarizer else {
            return Some(omitted);
        };

        if let Some((count, id, summary)) = &self.summary_cache {
            if *count == dropped.len() && *id == newest {
                return Some(format!("[Previous context summary]: {}", summary));
            }
        }

        let mut transcript = String::new();
        for msg in dropped {
            transcript.push_str(&format!("[{}]: {}\n\n", msg.role, msg.text()));
        }
        match summarizer.summarize(&transcript).await {
            Ok(summary) => {
                let note = format!("[Previous context summary]: {}", summary);
                self.summary_cache = Some((dropped.len(), newest, summary));
                Some(note)
            }
            Err(e) => {
                warn!(error = %e, "context summary failed, falling back to omission note");
                Some(omitted)
            }
        }
    }
}

/// Removes tool results whose call is not in `window` and tool calls whose
/// result is not in `window`.
fn repair_pairs(window: &[Message]) -> Vec<Message> {
    let calls: HashSet<String> = window
        .iter()
        .flat_map(|m| m.tool_calls())
        .map(|c| c.call_id.clone())
        .collect();
    let results: HashSet<String> = window
        .iter()
        .flat_map(|m| m.tool_results())
        .map(|r| r.call_id.clone())
        .collect();

    window
        .iter()
        .map(|msg| {
            let mut msg = msg.clone();
            msg.parts.retain(|part| match part {
                Part::ToolCall(call) => results.contains(&call.call_id),
                Part::ToolResult(result) => calls.contains(&result.call_id),
                Part::Text { .. } => true,
            });
            msg
        })
        .collect()
}
