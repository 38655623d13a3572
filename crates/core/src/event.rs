//! Workshop notifications: fire-and-forget progress events for observers.
//!
//! The engine emits [`WorkshopEvent`]s through a [`Notifier`] and never
//! waits on delivery. [`EventBus`] is the default broadcast-backed sink.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Every notification the engine emits. Serialized as
/// `{"event": <name>, "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum WorkshopEvent {
    #[serde(rename = "WorkshopPhaseStarted")]
    PhaseStarted { workbench_id: String, phase: String },

    #[serde(rename = "WorkshopPhaseCompleted")]
    PhaseCompleted { workbench_id: String, phase: String },

    #[serde(rename = "WorkshopImplementProgress")]
    ImplementProgress {
        workbench_id: String,
        current_item: usize,
        total_items: usize,
        item_label: String,
    },

    #[serde(rename = "WorkshopToolExecuting")]
    ToolExecuting {
        workbench_id: String,
        tool_name: String,
        tool_call_id: String,
    },

    #[serde(rename = "WorkshopToolComplete")]
    ToolComplete {
        workbench_id: String,
        tool_name: String,
        tool_call_id: String,
        success: bool,
    },

    #[serde(rename = "WorkshopAgentLoopWarning")]
    AgentLoopWarning {
        workbench_id: String,
        tool_name: String,
        turn: usize,
    },

    #[serde(rename = "WorkshopRateLimitWarning")]
    RateLimitWarning {
        workbench_id: String,
        provider_id: String,
        model_id: String,
        phase: String,
        retry_attempt: u32,
        retry_max: u32,
        wait_ms: u64,
        warning_message: String,
    },

    #[serde(rename = "WorkshopAssistantStreamDelta")]
    AssistantStreamDelta {
        workbench_id: String,
        message_id: String,
        token_delta: String,
    },

    #[serde(rename = "WorkshopAssistantMessageComplete")]
    AssistantMessageComplete {
        workbench_id: String,
        message_id: String,
    },

    #[serde(rename = "WorkshopRunCancelRequested")]
    RunCancelRequested { workbench_id: String },

    #[serde(rename = "WorkshopUndoCompleted")]
    UndoCompleted {
        workbench_id: String,
        conversation_head_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        draft_revision_id: Option<String>,
    },

    #[serde(rename = "WorkshopRegenerateStarted")]
    RegenerateStarted {
        workbench_id: String,
        from_message_id: Option<String>,
        target_message_id: String,
    },

    #[serde(rename = "WorkshopRegenerateCompleted")]
    RegenerateCompleted {
        workbench_id: String,
        message_id: String,
    },

    #[serde(rename = "WorkshopClutterChanged")]
    ClutterChanged {
        workbench_id: String,
        pending_tokens: u64,
    },

    #[serde(rename = "DraftStateChanged")]
    DraftStateChanged {
        workbench_id: String,
        has_draft: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        draft_id: Option<String>,
    },

    #[serde(rename = "CheckpointCreated")]
    CheckpointCreated {
        workbench_id: String,
        checkpoint_id: String,
        reason: String,
    },

    #[serde(rename = "CheckpointRestored")]
    CheckpointRestored {
        workbench_id: String,
        checkpoint_id: String,
    },
}

impl WorkshopEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            WorkshopEvent::PhaseStarted { .. } => "WorkshopPhaseStarted",
            WorkshopEvent::PhaseCompleted { .. } => "WorkshopPhaseCompleted",
            WorkshopEvent::ImplementProgress { .. } => "WorkshopImplementProgress",
            WorkshopEvent::ToolExecuting { .. } => "WorkshopToolExecuting",
            WorkshopEvent::ToolComplete { .. } => "WorkshopToolComplete",
            WorkshopEvent::AgentLoopWarning { .. } => "WorkshopAgentLoopWarning",
            WorkshopEvent::RateLimitWarning { .. } => "WorkshopRateLimitWarning",
            WorkshopEvent::AssistantStreamDelta { .. } => "WorkshopAssistantStreamDelta",
            WorkshopEvent::AssistantMessageComplete { .. } => "WorkshopAssistantMessageComplete",
            WorkshopEvent::RunCancelRequested { .. } => "WorkshopRunCancelRequested",
            WorkshopEvent::UndoCompleted { .. } => "WorkshopUndoCompleted",
            WorkshopEvent::RegenerateStarted { .. } => "WorkshopRegenerateStarted",
            WorkshopEvent::RegenerateCompleted { .. } => "WorkshopRegenerateCompleted",
            WorkshopEvent::ClutterChanged { .. } => "WorkshopClutterChanged",
            WorkshopEvent::DraftStateChanged { .. } => "DraftStateChanged",
            WorkshopEvent::CheckpointCreated { .. } => "CheckpointCreated",
            WorkshopEvent::CheckpointRestored { .. } => "CheckpointRestored",
        }
    }

    /// The payload object as sent over a transport.
    pub fn payload(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("payload").map(Value::take))
            .unwrap_or(Value::Null)
    }
}

/// Sink for engine notifications. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: WorkshopEvent);
}

/// A broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast`; slow subscribers lag instead of blocking
/// the engine.
pub struct EventBus {
    sender: broadcast::Sender<Arc<WorkshopEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: WorkshopEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<WorkshopEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for EventBus {
    fn notify(&self, event: WorkshopEvent) {
        self.publish(event);
    }
}
