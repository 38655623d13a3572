//! Chat messages exchanged with the model and the persisted conversation log.
//!
//! [`ChatMessage`] is the in-flight shape sent to an [`LlmClient`](crate::llm::LlmClient).
//! [`ConversationEntry`] is one line of `meta/conversation.jsonl`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_ID_NANOS: AtomicI64 = AtomicI64::new(0);

/// Time-based message id such as `u-1717171717000000000`.
///
/// Ids are strictly increasing within a process even when the clock does not
/// advance between calls.
pub fn next_message_id(prefix: &str) -> String {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut prev = LAST_ID_NANOS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_ID_NANOS.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return format!("{prefix}-{next}"),
            Err(actual) => prev = actual,
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A function call requested by the model.
///
/// `arguments` is kept as the raw JSON string the model produced; tools parse
/// it themselves so malformed arguments surface as tool errors, not transport
/// errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A single message in a model request or response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,

    #[serde(default)]
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// For tool-role messages: which call this answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }
}

/// Kind of a persisted conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    UserMessage,
    AssistantMessage,
    ToolResult,
    SystemEvent,
}

impl EntryType {
    /// Derive a type for legacy entries that only recorded a role.
    pub fn from_role(role: Option<Role>) -> Self {
        match role {
            Some(Role::User) => EntryType::UserMessage,
            Some(Role::Tool) => EntryType::ToolResult,
            Some(Role::System) => EntryType::SystemEvent,
            Some(Role::Assistant) | None => EntryType::AssistantMessage,
        }
    }
}

/// One line of `meta/conversation.jsonl`.
///
/// Older logs used `id`, `content`, `timestamp`, `kind` and `event`; those
/// names are accepted on read and the canonical names are written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    #[serde(rename = "type", alias = "kind", default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<EntryType>,

    #[serde(alias = "id", default)]
    pub message_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(alias = "content", default)]
    pub text: String,

    #[serde(alias = "timestamp", default)]
    pub created_at: String,

    #[serde(alias = "event", default, skip_serializing_if = "Option::is_none")]
    pub event_kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ConversationEntry {
    fn now(entry_type: EntryType, message_id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self {
            entry_type: Some(entry_type),
            message_id: message_id.into(),
            role: Some(role),
            text: text.into(),
            created_at: Utc::now().to_rfc3339(),
            event_kind: None,
            checkpoint_id: None,
            reason: None,
            metadata: None,
        }
    }

    pub fn user(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::now(EntryType::UserMessage, message_id, Role::User, text)
    }

    pub fn assistant(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::now(EntryType::AssistantMessage, message_id, Role::Assistant, text)
    }

    pub fn tool_result(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::now(EntryType::ToolResult, message_id, Role::Tool, text)
    }

    pub fn system_event(
        message_id: impl Into<String>,
        event_kind: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            event_kind: Some(event_kind.into()),
            ..Self::now(EntryType::SystemEvent, message_id, Role::System, text)
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Effective type, deriving one from the role for legacy entries.
    pub fn kind(&self) -> EntryType {
        self.entry_type.unwrap_or_else(|| EntryType::from_role(self.role))
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_strictly_increase() {
        let a = next_message_id("u");
        let b = next_message_id("u");
        let n = |id: &str| id.trim_start_matches("u-").parse::<i64>().unwrap();
        assert!(a.starts_with("u-"));
        assert!(n(&b) > n(&a));
    }

    #[test]
    fn tool_result_message_carries_call_id() {
        let msg = ChatMessage::tool_result("call_1", "ok");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn assistant_message_omits_empty_tool_calls() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert_eq!(json["role"], "assistant");
    }

    #[test]
    fn legacy_entry_fields_are_accepted() {
        let line = r#"{"id":"m1","role":"user","content":"hello","timestamp":"2024-01-01T00:00:00Z"}"#;
        let entry: ConversationEntry = serde_json::from_str(line).unwrap();
        assert_eq!(entry.message_id, "m1");
        assert_eq!(entry.text, "hello");
        assert_eq!(entry.created_at, "2024-01-01T00:00:00Z");
        assert_eq!(entry.kind(), EntryType::UserMessage);
    }

    #[test]
    fn legacy_kind_and_event_aliases() {
        let line = r#"{"kind":"system_event","event":"checkpoint_publish","content":"x"}"#;
        let entry: ConversationEntry = serde_json::from_str(line).unwrap();
        assert_eq!(entry.kind(), EntryType::SystemEvent);
        assert_eq!(entry.event_kind.as_deref(), Some("checkpoint_publish"));
    }

    #[test]
    fn canonical_names_are_written() {
        let entry = ConversationEntry::assistant("a-1", "done");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "assistant_message");
        assert_eq!(json["message_id"], "a-1");
        assert_eq!(json["text"], "done");
        assert!(json.get("content").is_none());
    }
}
