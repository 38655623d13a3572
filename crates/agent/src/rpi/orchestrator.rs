use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use workshop_core::error::{Error, ErrorSubphase, Result};
use workshop_core::event::WorkshopEvent;
use workshop_core::message::{ChatMessage, ConversationEntry, next_message_id};
use workshop_core::tool::{FocusHint, ToolHandler};
use workshop_tools::WorkshopToolHandler;

use super::RunError;
use super::plan::{Plan, PlanItem, PlanItemStatus, compact_reason, extract_new_items};
use super::prompts;
use super::state::RpiArtifacts;
use crate::env::RunEnv;
use crate::loop_runner::{AgentLoop, LoopOutcome, PhaseRequest};
use crate::manifest::{ManifestDetail, build_manifest};

const NO_PLAN: &str = "# Execution Plan\n\n(No plan artifact found.)";

/// What a completed run leaves for the caller.
#[derive(Debug, Clone)]
pub struct RpiOutcome {
    /// Id of the persisted summary message.
    pub message_id: String,
    pub summary: String,
    /// Where the implement phase's edits landed, by path.
    pub focus_hints: HashMap<String, FocusHint>,
}

pub struct RpiOrchestrator<'a> {
    env: &'a RunEnv,
    handler: &'a WorkshopToolHandler,
    artifacts: RpiArtifacts,
}

impl<'a> RpiOrchestrator<'a> {
    pub fn new(env: &'a RunEnv, handler: &'a WorkshopToolHandler) -> Self {
        Self {
            env,
            handler,
            artifacts: RpiArtifacts::new(&env.layout),
        }
    }

    /// Run every phase that has not completed yet, then the summary.
    pub async fn run(&self, user_prompt: &str) -> std::result::Result<RpiOutcome, RunError> {
        let env = self.env;
        let mut state = self.artifacts.state()?;
        info!(
            workbench_id = %env.workbench_id,
            has_research = state.has_research,
            has_plan = state.has_plan(),
            all_done = state.all_done(),
            "Phased run starting"
        );

        if !state.has_research {
            self.phase_started("research");
            self.research(user_prompt)
                .await
                .map_err(RunError::in_phase(ErrorSubphase::RpiResearch))?;
            self.phase_completed("research");
            state = self.artifacts.state()?;
        }

        if state.has_research && !state.has_plan() {
            self.phase_started("plan");
            self.plan(user_prompt)
                .await
                .map_err(RunError::in_phase(ErrorSubphase::RpiPlan))?;
            self.phase_completed("plan");
            state = self.artifacts.state()?;
        }

        if state.has_plan() && !state.all_done() {
            self.phase_started("implement");
            self.implement(user_prompt)
                .await
                .map_err(RunError::in_phase(ErrorSubphase::RpiImplement))?;
            self.phase_completed("implement");
        }

        let (message_id, summary) = self
            .summary()
            .await
            .map_err(RunError::in_phase(ErrorSubphase::RpiSummary))?;
        Ok(RpiOutcome {
            message_id,
            summary,
            focus_hints: self.handler.focus_hints(),
        })
    }

    async fn research(&self, user_prompt: &str) -> Result<()> {
        let manifest = self.manifest(ManifestDetail::Full).await?;
        let messages = vec![
            ChatMessage::system(format!("{}\n\n{manifest}", prompts::RESEARCH_PROMPT)),
            ChatMessage::user(or_default(user_prompt, "Analyze the available files and prepare research findings.")),
        ];
        let request = PhaseRequest::new("research", messages, self.handler.research_tools())
            .with_max_turns(self.env.config.agent.research_max_turns);
        let outcome = self.agent_loop().run(request).await?;
        if outcome.final_text.trim().is_empty() {
            return Err(Error::Validation("research phase produced no findings".into()));
        }
        self.artifacts.write_research(&outcome.final_text)?;
        debug!(workbench_id = %self.env.workbench_id, bytes = outcome.final_text.len(), "Research notes saved");
        Ok(())
    }

    async fn plan(&self, user_prompt: &str) -> Result<()> {
        let research = self.artifacts.research()?.unwrap_or_default();
        let manifest = self.manifest(ManifestDetail::Lightweight).await?;
        let content = format!(
            "User request:\n{}\n\nResearch summary:\n{}\n\nCurrent file manifest:\n{}",
            user_prompt.trim(),
            research.trim(),
            manifest.trim()
        );
        let messages = vec![
            ChatMessage::system(prompts::PLAN_PROMPT),
            ChatMessage::user(content.trim()),
        ];
        let request = PhaseRequest::new("plan", messages, self.handler.plan_tools())
            .with_max_turns(self.env.config.agent.plan_max_turns);
        let outcome = self.agent_loop().run(request).await?;

        let Some(mut plan) = Plan::parse(outcome.final_text.trim()) else {
            return Err(Error::Validation(
                "plan phase produced no actionable checklist items".into(),
            ));
        };
        plan.original_count = plan.item_count();
        self.artifacts.write_plan(&plan)?;
        info!(workbench_id = %self.env.workbench_id, items = plan.original_count, "Plan saved");
        Ok(())
    }

    /// Work through pending items in order. A failed item is retried once and
    /// then marked failed; only cancellation and rate-limit exhaustion stop
    /// the phase.
    async fn implement(&self, user_prompt: &str) -> Result<()> {
        let env = self.env;
        loop {
            let Some(mut plan) = self.artifacts.plan()? else {
                break;
            };
            let Some((position, item)) = plan.next_pending().map(|(p, i)| (p, i.clone())) else {
                break;
            };
            env.notify(WorkshopEvent::ImplementProgress {
                workbench_id: env.workbench_id.clone(),
                current_item: position + 1,
                total_items: plan.item_count(),
                item_label: item.label.trim().to_string(),
            });
            info!(workbench_id = %env.workbench_id, item = item.index, label = %item.label, "Implementing plan item");

            let messages = self.implement_messages(&plan, &item, user_prompt).await?;
            let outcome = match self.run_item(messages).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_canceled() || e.is_rate_limited() => return Err(e),
                Err(e) => {
                    let reason = compact_reason(&e.to_string());
                    warn!(workbench_id = %env.workbench_id, item = item.index, reason = %reason, "Plan item failed; retrying once");
                    let mut messages = self.implement_messages(&plan, &item, user_prompt).await?;
                    messages.push(ChatMessage::user(retry_instruction(&reason)));
                    match self.run_item(messages).await {
                        Ok(outcome) => outcome,
                        Err(e) if e.is_canceled() || e.is_rate_limited() => return Err(e),
                        Err(e) => {
                            warn!(workbench_id = %env.workbench_id, item = item.index, error = %e, "Plan item failed after retry");
                            plan.mark(position, PlanItemStatus::Failed(e.to_string()));
                            self.artifacts.write_plan(&plan)?;
                            continue;
                        }
                    }
                }
            };

            plan.mark(position, PlanItemStatus::Done);
            let new_items = extract_new_items(&outcome.final_text);
            if !new_items.is_empty() {
                let appended = plan.append_items(&new_items, env.config.agent.plan_inflation);
                if appended.dropped > 0 {
                    warn!(
                        workbench_id = %env.workbench_id,
                        original_count = plan.original_count,
                        requested = new_items.len(),
                        dropped = appended.dropped,
                        "Plan growth capped"
                    );
                }
            }
            self.artifacts.write_plan(&plan)?;
        }
        Ok(())
    }

    async fn run_item(&self, messages: Vec<ChatMessage>) -> Result<LoopOutcome> {
        let request = PhaseRequest::new("implement", messages, self.handler.all_tools())
            .with_max_turns(self.env.config.agent.item_max_turns);
        self.agent_loop().run(request).await
    }

    async fn implement_messages(
        &self,
        plan: &Plan,
        item: &PlanItem,
        user_prompt: &str,
    ) -> Result<Vec<ChatMessage>> {
        let manifest = self.manifest(ManifestDetail::Full).await?;
        let system = format!(
            "{}\n\nCurrent file manifest:\n{manifest}",
            prompts::implement_prompt(&item.render(), &plan.render())
        );
        Ok(vec![
            ChatMessage::system(system),
            ChatMessage::user(or_default(user_prompt, "Execute the current plan item.")),
        ])
    }

    /// Stream the closing message and persist it as the run's reply.
    async fn summary(&self) -> Result<(String, String)> {
        let env = self.env;
        self.phase_started("summary");
        let plan = self.artifacts.plan_markdown()?.unwrap_or_else(|| NO_PLAN.to_string());
        let manifest = self.manifest(ManifestDetail::Lightweight).await?;
        let messages = vec![
            ChatMessage::system(prompts::summary_prompt(plan.trim(), manifest.trim())),
            ChatMessage::user("Provide the final summary now."),
        ];

        let message_id = next_message_id("a");
        let streamed = Mutex::new(String::new());
        let on_delta = |delta: &str| {
            streamed
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push_str(delta);
            env.stream_delta(&message_id, delta);
        };
        let reply = env
            .retry_policy()
            .run(&env.retry_scope("summary"), || {
                env.llm.stream_chat(env.model_name(), &messages, &on_delta)
            })
            .await?;

        let streamed = streamed.into_inner().unwrap_or_else(|p| p.into_inner());
        let text = if streamed.trim().is_empty() {
            reply.trim().to_string()
        } else {
            streamed
        };

        env.clutter.clear(&env.workbench_id);
        env.append_conversation(&ConversationEntry::assistant(message_id.clone(), text.clone()))?;
        env.notify(WorkshopEvent::AssistantMessageComplete {
            workbench_id: env.workbench_id.clone(),
            message_id: message_id.clone(),
        });
        self.phase_completed("summary");
        Ok((message_id, text))
    }

    async fn manifest(&self, detail: ManifestDetail) -> Result<String> {
        build_manifest(
            self.env.store.as_ref(),
            self.env.worker.as_deref(),
            &self.env.workbench_id,
            detail,
        )
        .await
    }

    fn agent_loop(&self) -> AgentLoop<'_> {
        AgentLoop::new(self.env, self.handler)
    }

    fn phase_started(&self, phase: &str) {
        info!(workbench_id = %self.env.workbench_id, phase, "Phase started");
        self.env.notify(WorkshopEvent::PhaseStarted {
            workbench_id: self.env.workbench_id.clone(),
            phase: phase.to_string(),
        });
    }

    fn phase_completed(&self, phase: &str) {
        info!(workbench_id = %self.env.workbench_id, phase, "Phase completed");
        self.env.notify(WorkshopEvent::PhaseCompleted {
            workbench_id: self.env.workbench_id.clone(),
            phase: phase.to_string(),
        });
    }
}

fn or_default(prompt: &str, fallback: &str) -> String {
    match prompt.trim() {
        "" => fallback.to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn retry_instruction(reason: &str) -> String {
    let reason = reason.trim();
    let first = if reason.is_empty() {
        "Previous attempt failed.".to_string()
    } else {
        format!("Previous attempt failed with: {reason}")
    };
    format!("{first}\nRetry this same item with a different approach.")
}
