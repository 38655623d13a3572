//! Conversation persistence and replay into model messages.

use serde_json::Value;
use tracing::warn;

use workshop_core::error::Result;
use workshop_core::layout::WorkbenchLayout;
use workshop_core::message::{ChatMessage, ConversationEntry, EntryType, Role, ToolCall};
use workshop_workbench::{ConversationLog, revisions};

use crate::receipt::ReceiptBuilder;

/// Append an entry. User and assistant messages also snapshot the draft so
/// the conversation can later be rewound to them.
pub fn append(layout: &WorkbenchLayout, entry: &ConversationEntry) -> Result<()> {
    ConversationLog::open(layout).append(entry)?;
    if matches!(entry.role, Some(Role::User | Role::Assistant)) {
        if let Err(e) = revisions::record(layout, &entry.message_id) {
            warn!(message_id = %entry.message_id, error = %e, "Draft revision snapshot failed");
        }
    }
    Ok(())
}

/// Rebuild the model-facing history from the conversation log.
///
/// Tool results are replayed against their call ids, oversized ones as a
/// placeholder. Assistant turns get their tool calls back from metadata.
/// System events are not part of the model's view.
pub fn replay(entries: &[ConversationEntry], receipts: &ReceiptBuilder) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.kind() {
            EntryType::ToolResult => {
                let Some(call_id) = entry.metadata_str("tool_call_id").filter(|id| !id.is_empty())
                else {
                    continue;
                };
                messages.push(ChatMessage::tool_result(call_id, receipts.historical(&entry.text)));
            }
            EntryType::AssistantMessage => {
                let calls = entry
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("tool_calls"))
                    .map(tool_calls_from)
                    .unwrap_or_default();
                messages.push(ChatMessage::assistant_with_tools(entry.text.clone(), calls));
            }
            EntryType::UserMessage => messages.push(ChatMessage::user(entry.text.clone())),
            _ => {}
        }
    }
    messages
}

fn tool_calls_from(value: &Value) -> Vec<ToolCall> {
    // Raw JSON strings are accepted for entries written by older builds.
    let parsed = match value {
        Value::String(raw) => serde_json::from_str(raw),
        other => serde_json::from_value(other.clone()),
    };
    parsed.unwrap_or_else(|e| {
        warn!(error = %e, "Unreadable tool_calls metadata");
        Vec::new()
    })
}
