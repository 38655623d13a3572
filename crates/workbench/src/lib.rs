//! # workshop-workbench
//!
//! Filesystem storage for workbenches: the [`FsWorkbenchStore`] implementation
//! of the store trait, plus the per-workbench logs and artifacts the engine
//! keeps next to the files.

pub mod checkpoints;
pub mod conversation;
pub mod diff;
pub mod fs_store;
pub mod fsutil;
pub mod review_artifacts;
pub mod revisions;
pub mod sandbox;
pub mod tool_log;
pub mod workshop_state;

pub use conversation::ConversationLog;
pub use diff::{DiffLine, Hunk, LineKind, text_diff, text_diff_with_limit};
pub use fs_store::{FsWorkbenchStore, Workbench};
pub use review_artifacts::ReviewArtifacts;
pub use revisions::DraftRevision;
pub use tool_log::{ToolLog, ToolLogEntry};
pub use workshop_state::WorkshopState;
