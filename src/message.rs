//! Message types for kiri's conversation history.
//!
//! A [`Message`] is one conversational turn made of ordered [`Part`]s. These
//! are kiri's internal, persisted types; they are projected into the
//! provider-facing shape by [`crate::history::project_for_provider`].

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Strictly increasing (within a session) message identifier.
///
/// Derived from the microsecond clock, so ids are also roughly chronological
/// across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Zero-padded form used as the storage key, so key order equals id order.
    pub fn key(&self) -> String {
        format!("{:020}", self.0)
    }

    /// Parses a storage key produced by [`MessageId::key`].
    pub fn from_key(key: &str) -> Option<Self> {
        key.parse().ok().map(Self)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{:020}", self.0)
    }
}

/// Hands out message ids that never go backwards, even if the clock does.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    /// Starts after `last`, typically the newest id already stored for the session.
    pub fn after(last: Option<MessageId>) -> Self {
        Self {
            last: last.map(|id| id.0).unwrap_or(0),
        }
    }

    pub fn next(&mut self) -> MessageId {
        let now = Utc::now().timestamp_micros().max(0) as u64;
        self.last = now.max(self.last + 1);
        MessageId(self.last)
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a tool call inside a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Completed,
    Error,
    Denied,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallPart {
    /// Provider-assigned id used to match the result.
    pub call_id: String,
    pub name: String,
    pub args: Value,
    pub status: ToolStatus,
}

/// The outcome of one tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultPart {
    /// Back-reference to the originating [`ToolCallPart::call_id`].
    pub call_id: String,
    pub title: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl ToolResultPart {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text the model sees for this result.
    pub fn content(&self) -> String {
        match &self.error {
            Some(err) if self.output.is_empty() => format!("Error: {}", err),
            Some(err) => format!("{}\nError: {}", self.output, err),
            None => self.output.clone(),
        }
    }
}

/// One tagged fragment of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text { text: String },
    ToolCall(ToolCallPart),
    ToolResult(ToolResultPart),
}

/// Approximate token counts for an assistant turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: usize,
    pub output: usize,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub session_id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Message {
    pub fn user(id: MessageId, session_id: &str, text: impl Into<String>) -> Self {
        Self {
            id,
            session_id: session_id.to_string(),
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
            created_at: Utc::now().to_rfc3339(),
            agent: None,
            usage: None,
        }
    }

    pub fn assistant(id: MessageId, session_id: &str, agent: &str) -> Self {
        Self {
            id,
            session_id: session_id.to_string(),
            role: Role::Assistant,
            parts: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
            agent: Some(agent.to_string()),
            usage: None,
        }
    }

    /// Appends streamed text, extending the trailing text part if there is one.
    pub fn push_text(&mut self, delta: &str) {
        if let Some(Part::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
        } else {
            self.parts.push(Part::Text {
                text: delta.to_string(),
            });
        }
    }

    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallPart> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResultPart> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    /// Marks the tool-call part with `call_id` as finished.
    pub fn set_call_status(&mut self, call_id: &str, status: ToolStatus) {
        for part in &mut self.parts {
            if let Part::ToolCall(call) = part {
                if call.call_id == call_id {
                    call.status = status;
                }
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "you"),
            Role::Assistant => write!(f, "kiri"),
        }
    }
}

/// Checks that every tool result answers exactly one earlier tool call.
///
/// Returns the offending call id on failure.
pub fn check_pairing(messages: &[Message]) -> Result<(), String> {
    use std::collections::HashMap;

    // call id -> number of results seen so far
    let mut calls: HashMap<&str, usize> = HashMap::new();
    for msg in messages {
        for part in &msg.parts {
            match part {
                Part::ToolCall(call) => {
                    if calls.insert(call.call_id.as_str(), 0).is_some() {
                        return Err(call.call_id.clone());
                    }
                }
                Part::ToolResult(result) => match calls.get_mut(result.call_id.as_str()) {
                    Some(seen) if *seen == 0 => *seen = 1,
                    _ => return Err(result.call_id.clone()),
                },
                Part::Text { .. } => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str) -> Part {
        Part::ToolCall(ToolCallPart {
            call_id: id.into(),
            name: "ls".into(),
            args: json!({}),
            status: ToolStatus::Completed,
        })
    }

    fn result(id: &str) -> Part {
        Part::ToolResult(ToolResultPart {
            call_id: id.into(),
            title: "ls".into(),
            output: "a\nb".into(),
            error: None,
            metadata: Value::Null,
        })
    }

    #[test]
    fn test_id_generator_is_strictly_increasing() {
        let far_future = MessageId(u64::MAX / 2);
        let mut ids = IdGenerator::after(Some(far_future));
        let a = ids.next();
        let b = ids.next();
        assert!(a > far_future);
        assert!(b > a);
        assert_eq!(MessageId::from_key(&a.key()), Some(a));
        assert!(a.key() < b.key());
    }

    #[test]
    fn test_push_text_extends_trailing_part() {
        let mut msg = Message::assistant(MessageId(1), "s", "build");
        msg.push_text("hel");
        msg.push_text("lo");
        msg.parts.push(call("c1"));
        msg.push_text("after");
        assert_eq!(msg.parts.len(), 3);
        assert_eq!(msg.text(), "hello\nafter");
    }

    #[test]
    fn test_part_serde_shape() {
        let value = serde_json::to_value(call("c1")).unwrap();
        assert_eq!(value["type"], "tool-call");
        assert_eq!(value["call_id"], "c1");
        let value = serde_json::to_value(result("c1")).unwrap();
        assert_eq!(value["type"], "tool-result");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_check_pairing() {
        let mut first = Message::assistant(MessageId(1), "s", "build");
        first.parts = vec![call("c1"), result("c1")];
        let mut second = Message::assistant(MessageId(2), "s", "build");
        second.parts = vec![call("c2")];
        let mut third = Message::assistant(MessageId(3), "s", "build");
        third.parts = vec![result("c2")];
        assert!(check_pairing(&[first.clone(), second.clone(), third.clone()]).is_ok());

        // result before its call
        assert_eq!(check_pairing(&[third.clone(), second.clone()]), Err("c2".into()));

        // duplicate result
        let mut dup = Message::assistant(MessageId(4), "s", "build");
        dup.parts = vec![result("c1")];
        assert_eq!(check_pairing(&[first, dup]), Err("c1".into()));
    }

    #[test]
    fn test_error_result_content() {
        let part = ToolResultPart {
            call_id: "c".into(),
            title: "bash".into(),
            output: String::new(),
            error: Some("boom".into()),
            metadata: Value::Null,
        };
        assert!(part.is_error());
        assert_eq!(part.content(), "Error: boom");
    }
}
