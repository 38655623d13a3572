//! # Workshop Core
//!
//! Domain types, collaborator traits and error definitions for the workshop
//! engine: the orchestration core that drives an LLM through tool calls to
//! produce reviewable drafts inside a sandboxed workbench.
//!
//! Every external collaborator is a trait here:
//! - [`LlmClient`]: model access, with rate-limit aware errors
//! - [`ToolHandler`] / [`ToolWorker`]: tool execution and office-format backend
//! - [`WorkbenchStore`]: published/draft/staging files and checkpoints
//! - [`Notifier`]: fire-and-forget progress events
//!
//! Implementations live in their own crates; tests substitute scripted fakes.

pub mod error;
pub mod event;
pub mod layout;
pub mod llm;
pub mod message;
pub mod store;
pub mod tool;

pub use error::{Error, ErrorCode, ErrorInfo, LlmError, Result, StoreError, ToolError};
pub use event::{EventBus, Notifier, WorkshopEvent};
pub use layout::WorkbenchLayout;
pub use llm::{DeltaSink, LlmClient, ToolDefinition};
pub use message::{ChatMessage, ConversationEntry, EntryType, Role, ToolCall, next_message_id};
pub use store::{Area, CheckpointInfo, DraftState, FileEntry, FileKind, WorkbenchStore};
pub use tool::{FocusHint, Tool, ToolHandler, ToolRegistry, ToolWorker};
