//! Everything one run needs: the workbench, the model, the collaborators and
//! the run's cancellation token.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use workshop_config::EngineConfig;
use workshop_core::error::Result;
use workshop_core::event::{Notifier, WorkshopEvent};
use workshop_core::layout::WorkbenchLayout;
use workshop_core::llm::LlmClient;
use workshop_core::message::ConversationEntry;
use workshop_core::store::WorkbenchStore;
use workshop_core::tool::ToolWorker;
use workshop_workbench::{ConversationLog, ToolLog};

use crate::clutter::ClutterCounter;
use crate::history;
use crate::receipt::ReceiptBuilder;
use crate::retry::{RetryPolicy, RetryScope, Sleeper};

pub struct RunEnv {
    pub workbench_id: String,
    /// Qualified model id, `provider:model`.
    pub model_id: String,
    pub llm: Arc<dyn LlmClient>,
    pub store: Arc<dyn WorkbenchStore>,
    pub worker: Option<Arc<dyn ToolWorker>>,
    pub notifier: Arc<dyn Notifier>,
    pub sleeper: Arc<dyn Sleeper>,
    pub clutter: Arc<ClutterCounter>,
    pub config: Arc<EngineConfig>,
    pub cancel: CancellationToken,
    pub layout: WorkbenchLayout,
    pub tool_log: Arc<ToolLog>,
}

impl RunEnv {
    /// Model name as the provider expects it, without the provider prefix.
    pub fn model_name(&self) -> &str {
        self.model_id
            .split_once(':')
            .map_or(self.model_id.as_str(), |(_, name)| name)
    }

    pub fn provider_id(&self) -> &str {
        self.llm.provider_id()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(&self.config.retry)
    }

    pub fn retry_scope<'a>(&'a self, phase: &'a str) -> RetryScope<'a> {
        RetryScope {
            workbench_id: &self.workbench_id,
            provider_id: self.llm.provider_id(),
            model_id: &self.model_id,
            phase,
            notifier: self.notifier.as_ref(),
            sleeper: self.sleeper.as_ref(),
            cancel: &self.cancel,
        }
    }

    pub fn receipts(&self) -> ReceiptBuilder {
        ReceiptBuilder::new(&self.config.receipts)
    }

    pub fn notify(&self, event: WorkshopEvent) {
        self.notifier.notify(event);
    }

    pub fn conversation(&self) -> ConversationLog {
        ConversationLog::open(&self.layout)
    }

    /// Persist a conversation entry and report the remaining clutter.
    pub fn append_conversation(&self, entry: &ConversationEntry) -> Result<()> {
        history::append(&self.layout, entry)?;
        self.emit_clutter();
        Ok(())
    }

    pub fn emit_clutter(&self) {
        self.notify(WorkshopEvent::ClutterChanged {
            workbench_id: self.workbench_id.clone(),
            pending_tokens: self.clutter.pending_tokens(&self.workbench_id),
        });
    }

    /// Count a streamed delta and forward it to observers.
    pub fn stream_delta(&self, message_id: &str, delta: &str) {
        if let Some(pending_tokens) = self.clutter.add(&self.workbench_id, delta) {
            self.notify(WorkshopEvent::ClutterChanged {
                workbench_id: self.workbench_id.clone(),
                pending_tokens,
            });
        }
        self.notify(WorkshopEvent::AssistantStreamDelta {
            workbench_id: self.workbench_id.clone(),
            message_id: message_id.to_string(),
            token_delta: delta.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedLlm, TestBench};

    #[test]
    fn model_name_drops_provider_prefix() {
        let bench = TestBench::new(&[]);
        let mut env = bench.env(Arc::new(ScriptedLlm::new()));
        assert_eq!(env.model_name(), "gpt-4o");
        env.model_id = "bare-model".into();
        assert_eq!(env.model_name(), "bare-model");
    }

    #[test]
    fn stream_delta_emits_clutter_then_delta() {
        let bench = TestBench::new(&[]);
        let env = bench.env(Arc::new(ScriptedLlm::new()));
        env.stream_delta("a-1", "12345678");
        assert_eq!(
            bench.notifier.names(),
            vec!["WorkshopClutterChanged", "WorkshopAssistantStreamDelta"]
        );
        assert_eq!(
            bench.notifier.named("WorkshopClutterChanged")[0].payload()["pending_tokens"],
            2
        );
    }
}
