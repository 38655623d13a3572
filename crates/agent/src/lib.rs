//! The workshop engine.
//!
//! A user message runs through four phases, each resumable from what it
//! left on disk:
//!
//! 1. **Research**: read-only tools, notes saved as `research.md`
//! 2. **Plan**: a checklist of atomic items
//! 3. **Implement**: one agent loop per pending item, with all tools
//! 4. **Summary**: one streamed message for the user
//!
//! Every agent loop shares the same machinery: loop detection on tool-call
//! fingerprints, compact receipts in place of large tool results, the tool
//! log, and rate-limit retry with exponential backoff. Edits land in a
//! draft that is reviewed, then published or discarded.

pub mod apply;
pub mod clutter;
pub mod consent;
pub mod env;
pub mod fingerprint;
pub mod history;
pub mod loop_detector;
pub mod loop_runner;
pub mod manifest;
pub mod receipt;
pub mod retry;
pub mod review;
pub mod rpi;
pub mod run_registry;
pub mod workshop;

#[cfg(test)]
mod testing;

pub use apply::{ApplyOutcome, Proposal, ProposalOp, ProposalWrite};
pub use env::RunEnv;
pub use loop_detector::{LoopDetector, LoopVerdict};
pub use loop_runner::{AgentLoop, LoopOutcome, PhaseRequest};
pub use receipt::ReceiptBuilder;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use review::{ChangeSet, ReferenceSource, TextDiff};
pub use rpi::{Plan, PlanItem, PlanItemStatus, RpiArtifacts, RpiState, RunError};
pub use run_registry::{RunGuard, RunRegistry};
pub use workshop::{RunResult, Workshop};
