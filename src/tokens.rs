//! Token estimation for kiri.
//!
//! The default estimator is the cheap character heuristic (one token per four
//! characters), which is deterministic and free. The `bpe` estimator uses
//! tiktoken-rs: the exact tokenizer for OpenAI models, cl100k_base as an
//! approximation for everything else.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tiktoken_rs::{get_bpe_from_model, CoreBPE};

use crate::constants::{CHARS_PER_TOKEN, TOKENS_CONVERSATION_FRAMING, TOKENS_PER_MESSAGE_OVERHEAD};
use crate::message::{Message, Part};

/// Estimator selected in `[runtime] token_estimator`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    #[default]
    Chars,
    Bpe,
}

/// Counts (approximate) tokens for messages and text.
#[derive(Clone)]
pub enum TokenEstimator {
    Chars,
    Bpe(Arc<CoreBPE>),
}

impl fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenEstimator::Chars => write!(f, "TokenEstimator::Chars"),
            TokenEstimator::Bpe(_) => write!(f, "TokenEstimator::Bpe"),
        }
    }
}

impl TokenEstimator {
    /// Builds the estimator for `kind`. If no BPE table can be loaded the
    /// character heuristic is used instead.
    pub fn new(kind: EstimatorKind, model: &str) -> Self {
        match kind {
            EstimatorKind::Chars => TokenEstimator::Chars,
            EstimatorKind::Bpe => match get_bpe_from_model(model).or_else(|_| tiktoken_rs::cl100k_base()) {
                Ok(bpe) => TokenEstimator::Bpe(Arc::new(bpe)),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load BPE tokenizer, using character estimate");
                    TokenEstimator::Chars
                }
            },
        }
    }

    pub fn count_text(&self, text: &str) -> usize {
        match self {
            TokenEstimator::Chars => text.chars().count().div_ceil(CHARS_PER_TOKEN),
            TokenEstimator::Bpe(bpe) => bpe.encode_ordinary(text).len(),
        }
    }

    /// Estimated cost of one message, including per-message overhead.
    pub fn count_message(&self, message: &Message) -> usize {
        let mut total = TOKENS_PER_MESSAGE_OVERHEAD;
        for part in &message.parts {
            total += match part {
                Part::Text { text } => self.count_text(text),
                Part::ToolCall(call) => {
                    self.count_text(&call.name) + self.count_text(&call.args.to_string())
                }
                Part::ToolResult(result) => self.count_text(&result.content()),
            };
        }
        total
    }

    /// Estimated cost of a whole conversation.
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum::<usize>() + TOKENS_CONVERSATION_FRAMING
    }
}

/// Format a token count for display. Example: "1,234 / 100,000"
pub fn format_token_usage(used: usize, limit: usize) -> String {
    format!("{} / {}", format_number(used), format_number(limit))
}

pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
