//! The `Workshop` engine: one long-lived object owning the run registry, the
//! consent cache and the clutter counter, and exposing every workshop
//! operation for a workbench.

use serde::Serialize;
use serde_json::{Map, json};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use workshop_config::EngineConfig;
use workshop_core::error::{Error, LlmError, Result, StoreError};
use workshop_core::event::{Notifier, WorkshopEvent};
use workshop_core::llm::LlmClient;
use workshop_core::message::{ChatMessage, ConversationEntry, EntryType, next_message_id};
use workshop_core::store::{CheckpointInfo, DraftState, WorkbenchStore};
use workshop_core::tool::{FocusHint, ToolHandler, ToolWorker};
use workshop_tools::WorkshopToolHandler;
use workshop_workbench::{ConversationLog, ReviewArtifacts, ToolLog, WorkshopState, revisions};

use crate::apply::{ApplyOutcome, Proposal, ProposalApplier};
use crate::clutter::ClutterCounter;
use crate::consent::ConsentCache;
use crate::env::RunEnv;
use crate::history;
use crate::loop_runner::{AgentLoop, PhaseRequest};
use crate::manifest::{ManifestDetail, build_manifest};
use crate::retry::{Sleeper, TokioSleeper};
use crate::review::{ChangeSet, Review, TextDiff};
use crate::rpi::{RpiArtifacts, RpiOrchestrator, RunError, prompts};
use crate::run_registry::RunRegistry;

/// Result of a phased run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub message_id: String,
    pub has_draft: bool,
}

pub struct Workshop {
    config: Arc<EngineConfig>,
    store: Arc<dyn WorkbenchStore>,
    llm: Arc<dyn LlmClient>,
    worker: Option<Arc<dyn ToolWorker>>,
    notifier: Arc<dyn Notifier>,
    sleeper: Arc<dyn Sleeper>,
    runs: Arc<RunRegistry>,
    consent: ConsentCache,
    clutter: Arc<ClutterCounter>,
}

impl Workshop {
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<dyn WorkbenchStore>,
        llm: Arc<dyn LlmClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clutter: Arc::new(ClutterCounter::new(&config.clutter)),
            config,
            store,
            llm,
            worker: None,
            notifier,
            sleeper: Arc::new(TokioSleeper),
            runs: Arc::new(RunRegistry::new()),
            consent: ConsentCache::new(),
        }
    }

    pub fn with_worker(mut self, worker: Arc<dyn ToolWorker>) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn notify(&self, event: WorkshopEvent) {
        self.notifier.notify(event);
    }

    fn notify_draft_state(&self, workbench_id: &str, draft: Option<&DraftState>) {
        self.notify(WorkshopEvent::DraftStateChanged {
            workbench_id: workbench_id.to_string(),
            has_draft: draft.is_some(),
            draft_id: draft.map(|d| d.draft_id.clone()),
        });
    }

    fn clear_pending_proposal(&self, workbench_id: &str) {
        let cleared = self
            .store
            .layout(workbench_id)
            .and_then(|layout| WorkshopState::update(&layout, |s| s.pending_proposal_id = None));
        if let Err(e) = cleared {
            warn!(workbench_id, error = %e, "Could not clear pending proposal");
        }
    }

    /// The workbench's chosen model, else the configured default.
    pub fn active_model(&self, workbench_id: &str) -> Result<String> {
        let state = WorkshopState::load(&self.store.layout(workbench_id)?)?;
        Ok(match state.active_model_id.trim() {
            "" => self.config.default_model.clone(),
            chosen => chosen.to_string(),
        })
    }

    pub fn set_active_model(&self, workbench_id: &str, model_id: &str) -> Result<()> {
        let layout = self.store.layout(workbench_id)?;
        WorkshopState::update(&layout, |s| s.active_model_id = model_id.trim().to_string())?;
        Ok(())
    }

    fn ensure_unlocked(&self, workbench_id: &str) -> Result<()> {
        if self.store.draft_state(workbench_id)?.is_some() {
            return Err(Error::Validation(
                "draft exists; review or discard before continuing".into(),
            ));
        }
        Ok(())
    }

    fn ensure_consent(&self, workbench_id: &str) -> Result<()> {
        let provider_id = self.llm.provider_id();
        if !self.config.require_egress_consent || self.consent.has(workbench_id, provider_id) {
            return Ok(());
        }
        let scope = self.store.compute_scope_hash(workbench_id)?;
        debug!(workbench_id, provider_id, scope = %scope, "Egress consent missing");
        Err(LlmError::EgressBlocked(format!(
            "consent required to send workbench files to {provider_id}"
        ))
        .into())
    }

    pub fn grant_session_consent(&self, workbench_id: &str, provider_id: &str) {
        self.consent.grant(workbench_id, provider_id);
    }

    pub fn has_session_consent(&self, workbench_id: &str, provider_id: &str) -> bool {
        self.consent.has(workbench_id, provider_id)
    }

    fn run_env(&self, workbench_id: &str, model_id: String, cancel: CancellationToken) -> Result<RunEnv> {
        let layout = self.store.layout(workbench_id)?;
        Ok(RunEnv {
            workbench_id: workbench_id.to_string(),
            model_id,
            llm: self.llm.clone(),
            store: self.store.clone(),
            worker: self.worker.clone(),
            notifier: self.notifier.clone(),
            sleeper: self.sleeper.clone(),
            clutter: self.clutter.clone(),
            config: self.config.clone(),
            cancel,
            tool_log: Arc::new(ToolLog::open(&layout)),
            layout,
        })
    }

    fn tool_handler(&self, workbench_id: &str) -> WorkshopToolHandler {
        WorkshopToolHandler::new(workbench_id, self.store.clone(), self.worker.clone())
    }

    pub fn conversation(&self, workbench_id: &str) -> Result<Vec<ConversationEntry>> {
        Ok(ConversationLog::open(&self.store.layout(workbench_id)?).read()?)
    }

    pub fn rpi_artifacts(&self, workbench_id: &str) -> Result<RpiArtifacts> {
        Ok(RpiArtifacts::new(&self.store.layout(workbench_id)?))
    }

    /// Record a user message. Starts a fresh phased run on the next call to
    /// [`Workshop::run_agent`].
    pub fn send_user_message(&self, workbench_id: &str, text: &str) -> Result<String> {
        self.ensure_unlocked(workbench_id)?;
        if text.trim().is_empty() {
            return Err(Error::Validation("empty message".into()));
        }
        let message_id = next_message_id("u");
        let layout = self.store.layout(workbench_id)?;
        history::append(&layout, &ConversationEntry::user(&message_id, text))?;
        RpiArtifacts::new(&layout).clear()?;
        debug!(workbench_id, message_id = %message_id, "User message recorded");
        Ok(message_id)
    }

    /// Run the phased workflow for a user message (the latest one if
    /// `message_id` is `None`).
    pub async fn run_agent(
        &self,
        workbench_id: &str,
        message_id: Option<&str>,
    ) -> std::result::Result<RunResult, RunError> {
        self.clutter.clear(workbench_id);
        let result = self.run_agent_inner(workbench_id, message_id).await;
        self.clutter.clear(workbench_id);
        result
    }

    async fn run_agent_inner(
        &self,
        workbench_id: &str,
        message_id: Option<&str>,
    ) -> std::result::Result<RunResult, RunError> {
        self.ensure_unlocked(workbench_id)?;
        let guard = self.runs.begin(workbench_id)?;
        let model_id = self.active_model(workbench_id)?;
        self.ensure_consent(workbench_id)?;
        let started = Instant::now();

        let user_prompt = self.resolve_user_prompt(workbench_id, message_id)?;
        let env = self.run_env(workbench_id, model_id, guard.token())?;
        let handler = self.tool_handler(workbench_id);
        info!(workbench_id, run_id = guard.run_id(), model = %env.model_id, "Workshop run starting");

        let outcome = RpiOrchestrator::new(&env, &handler).run(&user_prompt).await?;

        let draft = self.store.draft_state(workbench_id).map_err(Error::from)?;
        if let Some(draft) = &draft {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let mut metadata = Map::new();
            metadata.insert("job_elapsed_ms".into(), json!(elapsed_ms));
            env.conversation()
                .update_metadata(&outcome.message_id, metadata)
                .map_err(|e| Error::FileWrite(e.to_string()))?;
            self.notify_draft_state(workbench_id, Some(draft));

            let artifacts = ReviewArtifacts::new(env.layout.clone(), &draft.draft_id);
            let summary = outcome.summary.trim();
            if !summary.is_empty() {
                artifacts
                    .write_draft_summary(summary)
                    .map_err(|e| Error::FileWrite(e.to_string()))?;
            }
            if !outcome.focus_hints.is_empty() {
                artifacts
                    .write_focus_hints(&outcome.focus_hints)
                    .map_err(|e| Error::FileWrite(e.to_string()))?;
            }
        }
        info!(
            workbench_id,
            message_id = %outcome.message_id,
            has_draft = draft.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Workshop run finished"
        );
        Ok(RunResult {
            message_id: outcome.message_id,
            has_draft: draft.is_some(),
        })
    }

    fn resolve_user_prompt(&self, workbench_id: &str, message_id: Option<&str>) -> Result<String> {
        let user_message_id = self.resolve_user_message(workbench_id, message_id)?;
        self.conversation(workbench_id)?
            .into_iter()
            .find(|e| e.message_id == user_message_id && e.kind() == EntryType::UserMessage)
            .map(|e| e.text.trim().to_string())
            .ok_or_else(|| Error::Validation("user prompt not found".into()))
    }

    /// The user message a run or regenerate targets: the given user message,
    /// the user message before a given assistant message, or the latest one.
    pub fn resolve_user_message(&self, workbench_id: &str, message_id: Option<&str>) -> Result<String> {
        let entries = self.conversation(workbench_id)?;
        if entries.is_empty() {
            return Err(Error::Validation("conversation is empty".into()));
        }
        let is_message = |e: &ConversationEntry| {
            matches!(e.kind(), EntryType::UserMessage | EntryType::AssistantMessage)
        };
        let target = match message_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => ConversationLog::find_index(&entries, id)
                .ok_or_else(|| Error::Validation("message not found".into()))?,
            None => entries
                .iter()
                .rposition(is_message)
                .ok_or_else(|| Error::Validation("no message available to regenerate".into()))?,
        };
        match entries[target].kind() {
            EntryType::UserMessage => Ok(entries[target].message_id.clone()),
            EntryType::AssistantMessage => entries[..target]
                .iter()
                .rev()
                .find(|e| e.kind() == EntryType::UserMessage)
                .map(|e| e.message_id.clone())
                .ok_or_else(|| {
                    Error::Validation("assistant message has no preceding user message".into())
                }),
            _ => Err(Error::Validation(
                "regenerate target must be a user or assistant message".into(),
            )),
        }
    }

    /// Request cancellation of the workbench's active run.
    pub fn cancel_run(&self, workbench_id: &str) -> bool {
        let requested = self.runs.cancel(workbench_id);
        if requested {
            self.notify(WorkshopEvent::RunCancelRequested {
                workbench_id: workbench_id.to_string(),
            });
        }
        requested
    }

    pub fn is_running(&self, workbench_id: &str) -> bool {
        self.runs.is_active(workbench_id)
    }

    /// Rewind the conversation and draft to just after `message_id`.
    /// Returns the restored draft revision id.
    pub fn undo_to_message(&self, workbench_id: &str, message_id: &str) -> Result<String> {
        if message_id.trim().is_empty() {
            return Err(Error::Validation("message_id is required".into()));
        }
        let revision_id = self.rewind_to(workbench_id, message_id)?;
        self.rpi_artifacts(workbench_id)?.clear()?;
        self.notify(WorkshopEvent::UndoCompleted {
            workbench_id: workbench_id.to_string(),
            conversation_head_id: message_id.to_string(),
            draft_revision_id: Some(revision_id.clone()),
        });
        Ok(revision_id)
    }

    fn rewind_to(&self, workbench_id: &str, message_id: &str) -> Result<String> {
        let layout = self.store.layout(workbench_id)?;
        let log = ConversationLog::open(&layout);
        let entries = log.read()?;
        let target = ConversationLog::find_index(&entries, message_id)
            .ok_or_else(|| Error::Validation("message not found".into()))?;

        if let Some(checkpoint_id) = published_checkpoint_after(&entries[target + 1..]) {
            let pre = self
                .store
                .checkpoint_create(workbench_id, "pre_restore", "Before rewind restore")?;
            self.store
                .checkpoint_restore_published(workbench_id, &checkpoint_id)?;
            info!(
                workbench_id,
                message_id,
                checkpoint_id = %checkpoint_id,
                pre_restore_checkpoint_id = %pre.checkpoint_id,
                "Published files rewound"
            );
        }

        log.rewrite(&entries[..=target])?;
        let revision = match revisions::restore(&layout, message_id) {
            Ok(revision) => revision,
            Err(StoreError::NotFound(_)) => {
                return Err(Error::Validation("draft revision not found for message".into()));
            }
            Err(e) => return Err(Error::FileWrite(e.to_string())),
        };
        let draft = self.store.draft_state(workbench_id)?;
        self.notify_draft_state(workbench_id, draft.as_ref());
        self.clear_pending_proposal(workbench_id);
        Ok(revision.revision_id)
    }

    /// Rewind to the targeted user message and run the workflow again.
    pub async fn regenerate(
        &self,
        workbench_id: &str,
        message_id: Option<&str>,
    ) -> std::result::Result<String, RunError> {
        let target = self.resolve_user_message(workbench_id, message_id)?;
        self.notify(WorkshopEvent::RegenerateStarted {
            workbench_id: workbench_id.to_string(),
            from_message_id: message_id.map(str::to_string),
            target_message_id: target.clone(),
        });
        self.rewind_to(workbench_id, &target)?;
        self.rpi_artifacts(workbench_id)?.clear()?;

        let result = self.run_agent(workbench_id, Some(&target)).await?;
        self.notify(WorkshopEvent::RegenerateCompleted {
            workbench_id: workbench_id.to_string(),
            message_id: result.message_id.clone(),
        });
        Ok(result.message_id)
    }

    /// Answer the conversation in one tool-using loop, outside the phased
    /// workflow. Turns and tool results are written to the conversation as
    /// they happen. Returns the final assistant message id.
    pub async fn stream_assistant_reply(&self, workbench_id: &str) -> Result<String> {
        self.ensure_unlocked(workbench_id)?;
        let guard = self.runs.begin(workbench_id)?;
        let model_id = self.active_model(workbench_id)?;
        self.ensure_consent(workbench_id)?;
        let env = self.run_env(workbench_id, model_id, guard.token())?;
        let handler = self.tool_handler(workbench_id);

        let manifest = build_manifest(
            self.store.as_ref(),
            self.worker.as_deref(),
            workbench_id,
            ManifestDetail::Full,
        )
        .await?;
        let mut messages = vec![ChatMessage::system(format!(
            "{}\n\n{manifest}",
            prompts::AGENT_PROMPT
        ))];
        messages.extend(history::replay(&self.conversation(workbench_id)?, &env.receipts()));

        let request = PhaseRequest::new("stream", messages, handler.all_tools())
            .with_max_turns(self.config.agent.max_agent_turns)
            .persisted()
            .streamed();
        self.clutter.clear(workbench_id);
        let outcome = AgentLoop::new(&env, &handler).run(request).await;
        self.clutter.clear(workbench_id);
        let outcome = outcome?;

        if let Some(draft) = self.store.draft_state(workbench_id)? {
            let hints = handler.focus_hints();
            if !hints.is_empty() {
                ReviewArtifacts::new(env.layout.clone(), &draft.draft_id)
                    .write_focus_hints(&hints)
                    .map_err(|e| Error::FileWrite(e.to_string()))?;
            }
            self.notify_draft_state(workbench_id, Some(&draft));
        }
        debug!(
            workbench_id,
            message_id = %outcome.message_id,
            turns = outcome.turns,
            tool_calls = outcome.tool_calls,
            "Assistant reply complete"
        );
        Ok(outcome.message_id)
    }

    /// Store a proposal and mark it as the one awaiting review.
    pub fn submit_proposal(&self, workbench_id: &str, proposal: &Proposal) -> Result<()> {
        let layout = self.store.layout(workbench_id)?;
        proposal.save(&layout)?;
        let pending = (!proposal.no_changes).then(|| proposal.proposal_id.clone());
        WorkshopState::update(&layout, |s| s.pending_proposal_id = pending)?;
        Ok(())
    }

    pub async fn apply_proposal(&self, workbench_id: &str, proposal_id: &str) -> Result<ApplyOutcome> {
        let proposal = Proposal::load(&self.store.layout(workbench_id)?, proposal_id)?;
        ProposalApplier {
            store: self.store.as_ref(),
            worker: self.worker.as_deref(),
            notifier: self.notifier.as_ref(),
            workbench_id,
            max_content_bytes: self.config.review.max_proposal_content_bytes,
        }
        .apply(&proposal)
        .await
    }

    fn review<'a>(&'a self, workbench_id: &'a str) -> Review<'a> {
        Review::new(
            self.store.as_ref(),
            self.worker.as_deref(),
            workbench_id,
            self.config.review.max_diff_lines,
        )
    }

    pub async fn review_text_diff(&self, workbench_id: &str, path: &str) -> Result<TextDiff> {
        self.review(workbench_id).text_diff(path).await
    }

    pub fn review_focus_hint(&self, workbench_id: &str, path: &str) -> Result<Option<FocusHint>> {
        self.review(workbench_id).focus_hint(path)
    }

    pub fn review_summary(&self, workbench_id: &str, path: &str) -> Result<Option<String>> {
        self.review(workbench_id).summary(path)
    }

    pub fn review_change_set(&self, workbench_id: &str) -> Result<ChangeSet> {
        self.review(workbench_id).change_set()
    }

    pub fn draft_state(&self, workbench_id: &str) -> Result<Option<DraftState>> {
        Ok(self.store.draft_state(workbench_id)?)
    }

    /// Publish the draft behind a checkpoint. Returns the checkpoint id.
    pub fn publish_draft(&self, workbench_id: &str) -> Result<String> {
        if self.store.draft_state(workbench_id)?.is_none() {
            return Err(StoreError::DraftMissing.into());
        }
        let checkpoint = self
            .store
            .checkpoint_create(workbench_id, "publish", "Before publish")?;
        self.store.publish_draft(workbench_id)?;

        let mut event = ConversationEntry::system_event(
            next_message_id("s"),
            "checkpoint_publish",
            "Created publish checkpoint.",
        );
        event.checkpoint_id = Some(checkpoint.checkpoint_id.clone());
        event.reason = Some("publish".into());
        event.created_at = checkpoint.created_at.clone();
        self.append_event(workbench_id, &event);
        info!(workbench_id, checkpoint_id = %checkpoint.checkpoint_id, "Draft published");

        self.notify(WorkshopEvent::CheckpointCreated {
            workbench_id: workbench_id.to_string(),
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            reason: "publish".into(),
        });
        self.notify_draft_state(workbench_id, None);
        self.clear_pending_proposal(workbench_id);
        Ok(checkpoint.checkpoint_id)
    }

    pub fn discard_draft(&self, workbench_id: &str) -> Result<()> {
        self.store.discard_draft(workbench_id)?;
        info!(workbench_id, "Draft discarded");
        self.notify_draft_state(workbench_id, None);
        self.clear_pending_proposal(workbench_id);
        Ok(())
    }

    pub fn checkpoint_create(&self, workbench_id: &str, description: &str) -> Result<CheckpointInfo> {
        let checkpoint = self
            .store
            .checkpoint_create(workbench_id, "manual", description)?;
        self.notify(WorkshopEvent::CheckpointCreated {
            workbench_id: workbench_id.to_string(),
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            reason: checkpoint.reason.clone(),
        });
        Ok(checkpoint)
    }

    pub fn checkpoints_list(&self, workbench_id: &str) -> Result<Vec<CheckpointInfo>> {
        Ok(self.store.checkpoints_list(workbench_id)?)
    }

    /// Restore a checkpoint behind a `pre_restore` one. Returns the
    /// pre-restore checkpoint id.
    pub fn checkpoint_restore(&self, workbench_id: &str, checkpoint_id: &str) -> Result<String> {
        self.ensure_unlocked(workbench_id)?;
        let pre = self
            .store
            .checkpoint_create(workbench_id, "pre_restore", "Before restore")?;
        self.store.checkpoint_restore(workbench_id, checkpoint_id)?;

        let mut metadata = Map::new();
        metadata.insert("pre_restore_checkpoint_id".into(), json!(pre.checkpoint_id));
        let mut event = ConversationEntry::system_event(
            next_message_id("s"),
            "checkpoint_restore",
            "Restored checkpoint.",
        )
        .with_metadata(metadata);
        event.checkpoint_id = Some(checkpoint_id.to_string());
        event.reason = Some("restore".into());
        self.append_event(workbench_id, &event);
        info!(workbench_id, checkpoint_id, pre_restore_checkpoint_id = %pre.checkpoint_id, "Checkpoint restored");

        self.notify(WorkshopEvent::CheckpointRestored {
            workbench_id: workbench_id.to_string(),
            checkpoint_id: checkpoint_id.to_string(),
        });
        Ok(pre.checkpoint_id)
    }

    fn append_event(&self, workbench_id: &str, entry: &ConversationEntry) {
        let appended = self
            .store
            .layout(workbench_id)
            .map_err(Error::from)
            .and_then(|layout| history::append(&layout, entry));
        if let Err(e) = appended {
            warn!(workbench_id, error = %e, "Could not record checkpoint event");
        }
    }
}

/// Checkpoint holding the published files as they were before a later
/// publish or restore, if any entry after the undo target recorded one.
fn published_checkpoint_after(entries: &[ConversationEntry]) -> Option<String> {
    entries.iter().find_map(|entry| {
        let id = match entry.event_kind.as_deref().map(str::trim) {
            Some("checkpoint_publish") => entry.checkpoint_id.as_deref(),
            Some("checkpoint_restore") => entry.metadata_str("pre_restore_checkpoint_id"),
            _ => None,
        };
        id.map(str::trim).filter(|id| !id.is_empty()).map(str::to_string)
    })
}
