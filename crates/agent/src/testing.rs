//! Shared test doubles for the agent tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use workshop_config::EngineConfig;
use workshop_core::error::{LlmError, ToolError};
use workshop_core::event::{Notifier, WorkshopEvent};
use workshop_core::layout::WorkbenchLayout;
use workshop_core::llm::{DeltaSink, LlmClient, ToolDefinition};
use workshop_core::message::{ChatMessage, ToolCall};
use workshop_core::store::WorkbenchStore;
use workshop_core::tool::ToolWorker;
use workshop_workbench::{FsWorkbenchStore, ToolLog};

use crate::clutter::ClutterCounter;
use crate::env::RunEnv;
use crate::retry::Sleeper;

/// A model that replays queued replies. Once a queue runs dry, tool chats
/// answer `"done"` and plain chats answer `"Summary."`.
#[derive(Default)]
pub struct ScriptedLlm {
    tool_replies: Mutex<VecDeque<Result<ChatMessage, LlmError>>>,
    chat_replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    offered: Mutex<Vec<Vec<String>>>,
    cancel_at: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool_reply(self, reply: ChatMessage) -> Self {
        self.tool_replies.lock().unwrap().push_back(Ok(reply));
        self
    }

    pub fn tool_error(self, err: LlmError) -> Self {
        self.tool_replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.tool_reply(ChatMessage::assistant(text))
    }

    pub fn calls(self, calls: Vec<ToolCall>) -> Self {
        self.tool_reply(ChatMessage::assistant_with_tools("", calls))
    }

    pub fn chat_reply(self, text: &str) -> Self {
        self.chat_replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn chat_error(self, err: LlmError) -> Self {
        self.chat_replies.lock().unwrap().push_back(Err(err));
        self
    }

    /// Message lists of every request, tool chats and plain chats alike.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    /// Tool names offered with each tool chat.
    pub fn offered_tools(&self) -> Vec<Vec<String>> {
        self.offered.lock().unwrap().clone()
    }

    /// Cancel `token` when the `nth` tool chat (1-based) arrives; that call
    /// then never answers.
    pub fn cancel_on_tool_chat(&self, nth: usize, token: CancellationToken) {
        *self.cancel_at.lock().unwrap() = Some((nth, token));
    }

    pub fn pending_tool_replies(&self) -> usize {
        self.tool_replies.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_id(&self) -> &str {
        "openai"
    }

    async fn chat(&self, _model: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.chat_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Summary.".into()))
    }

    async fn chat_with_tools(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, LlmError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.offered
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());
        let seen = self.offered.lock().unwrap().len();
        let cancel = self
            .cancel_at
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(nth, _)| *nth == seen)
            .map(|(_, token)| token.clone());
        if let Some(token) = cancel {
            token.cancel();
            std::future::pending::<()>().await;
        }
        self.tool_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatMessage::assistant("done")))
    }

    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        on_delta: DeltaSink<'_>,
    ) -> Result<String, LlmError> {
        let text = self.chat(model, messages).await?;
        // Two deltas so observers see a real stream.
        let mid = text.char_indices().nth(text.chars().count() / 2).map_or(0, |(i, _)| i);
        for part in [&text[..mid], &text[mid..]] {
            if !part.is_empty() {
                on_delta(part);
            }
        }
        Ok(text)
    }
}

pub fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<WorkshopEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<WorkshopEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn named(&self, name: &str) -> Vec<WorkshopEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name() == name)
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(WorkshopEvent::name).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: WorkshopEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Records requested waits and returns at once.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn secs(&self) -> Vec<u64> {
        self.waits.lock().unwrap().iter().map(Duration::as_secs).collect()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

/// A worker with scripted responses per method. Unscripted methods fail.
#[derive(Default)]
pub struct FakeWorker {
    responses: HashMap<String, Value>,
    unavailable: bool,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn respond(mut self, method: &str, response: Value) -> Self {
        self.responses.insert(method.to_string(), response);
        self
    }

    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl ToolWorker for FakeWorker {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push((method.to_string(), params));
        if self.unavailable {
            return Err(ToolError::WorkerUnavailable("worker not running".into()));
        }
        self.responses
            .get(method)
            .cloned()
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: method.to_string(),
                reason: "no scripted response".into(),
            })
    }
}

/// One workbench in a temp dir plus recording collaborators.
pub struct TestBench {
    pub dir: TempDir,
    pub store: Arc<FsWorkbenchStore>,
    pub workbench_id: String,
    pub notifier: Arc<RecordingNotifier>,
    pub sleeper: Arc<RecordingSleeper>,
    pub config: EngineConfig,
}

impl TestBench {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let store = FsWorkbenchStore::new(dir.path());
        let wb = store.create_workbench("test", "openai:gpt-4o").unwrap();
        let published = store.layout(&wb.id).unwrap().published_dir();
        for (name, content) in files {
            std::fs::write(published.join(name), content).unwrap();
        }
        Self {
            dir,
            store: Arc::new(store),
            workbench_id: wb.id,
            notifier: Arc::default(),
            sleeper: Arc::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn layout(&self) -> WorkbenchLayout {
        self.store.layout(&self.workbench_id).unwrap()
    }

    pub fn env(&self, llm: Arc<ScriptedLlm>) -> RunEnv {
        self.env_with_worker(llm, None)
    }

    pub fn env_with_worker(
        &self,
        llm: Arc<ScriptedLlm>,
        worker: Option<Arc<dyn ToolWorker>>,
    ) -> RunEnv {
        let layout = self.layout();
        RunEnv {
            workbench_id: self.workbench_id.clone(),
            model_id: "openai:gpt-4o".into(),
            llm,
            store: self.store.clone(),
            worker,
            notifier: self.notifier.clone(),
            sleeper: self.sleeper.clone(),
            clutter: Arc::new(ClutterCounter::default()),
            config: Arc::new(self.config.clone()),
            cancel: CancellationToken::new(),
            tool_log: Arc::new(ToolLog::open(&layout)),
            layout,
        }
    }
}
