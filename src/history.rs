//! Persisted message history and its projection into provider context.
//!
//! Messages are stored one file per message under
//! `["message", session_id, <zero-padded id>]`, so listing a session's keys
//! yields its messages in id order.

use std::collections::HashSet;

use crate::error::StorageError;
use crate::message::{Message, MessageId, Part};
use crate::provider::{AssistantBlock, ContextMessage};
use crate::storage::Storage;

/// Append-only message log on top of [`Storage`].
#[derive(Debug, Clone)]
pub struct MessageHistory {
    storage: Storage,
}

impl MessageHistory {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Writes `message` under its session and id. Rewriting the same id replaces it.
    pub fn save(&self, session_id: &str, message: &Message) -> Result<(), StorageError> {
        self.storage
            .write(&["message", session_id, &message.id.key()], message)
    }

    /// Returns the most recent `limit` messages, oldest first.
    ///
    /// A message that cannot be decoded is an error: history is never
    /// silently skipped.
    pub fn load(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, StorageError> {
        let keys = self.storage.list(&["message", session_id])?;
        let start = keys.len().saturating_sub(limit);
        let mut messages = Vec::with_capacity(keys.len() - start);
        for key in &keys[start..] {
            if let Some(message) = self.storage.read::<Message>(&["message", session_id, key])? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    pub fn count(&self, session_id: &str) -> Result<usize, StorageError> {
        Ok(self.storage.list(&["message", session_id])?.len())
    }

    pub fn last(&self, session_id: &str) -> Result<Option<Message>, StorageError> {
        Ok(self.load(session_id, 1)?.pop())
    }

    /// Id of the newest stored message, read from its key alone.
    pub fn last_id(&self, session_id: &str) -> Result<Option<MessageId>, StorageError> {
        let keys = self.storage.list(&["message", session_id])?;
        Ok(keys.last().and_then(|k| MessageId::from_key(k)))
    }

    /// Removes every message of the session, keeping the session itself.
    pub fn clear(&self, session_id: &str) -> Result<(), StorageError> {
        self.storage.delete_prefix(&["message", session_id])
    }
}

/// Maps kiri messages to the provider's shape.
///
/// User messages collapse into one text block. Assistant messages become
/// their interleaved text and tool-call blocks, followed by one
/// [`ContextMessage::ToolResult`] per result part. Calls without a result and
/// results without a call are left out so the provider never sees a broken pair.
pub fn project_for_provider(messages: &[Message]) -> Vec<ContextMessage> {
    let answered: HashSet<&str> = messages
        .iter()
        .flat_map(|m| m.tool_results())
        .map(|r| r.call_id.as_str())
        .collect();
    let mut issued: HashSet<&str> = HashSet::new();

    let mut out = Vec::new();
    for msg in messages {
        match msg.role {
            crate::message::Role::User => {
                out.push(ContextMessage::User(msg.text()));
            }
            crate::message::Role::Assistant => {
                let mut blocks = Vec::new();
                let mut results = Vec::new();
                for part in &msg.parts {
                    match part {
                        Part::Text { text } if text.is_empty() => {}
                        Part::Text { text } => blocks.push(AssistantBlock::Text(text.clone())),
                        Part::ToolCall(call) => {
                            if answered.contains(call.call_id.as_str()) {
                                issued.insert(call.call_id.as_str());
                                blocks.push(AssistantBlock::ToolCall {
                                    id: call.call_id.clone(),
                                    name: call.name.clone(),
                                    args: call.args.clone(),
                                });
                            }
                        }
                        Part::ToolResult(result) => {
                            if issued.contains(result.call_id.as_str()) {
                                results.push(ContextMessage::ToolResult {
                                    call_id: result.call_id.clone(),
                                    content: result.content(),
                                    is_error: result.is_error(),
                                });
                            }
                        }
                    }
                }
                if !blocks.is_empty() {
                    out.push(ContextMessage::Assistant(blocks));
                }
                out.extend(results);
            }
        }
    }
    out
}
