//! The agent loop for one phase.
//!
//! Each turn sends the history and the phase's tool schemas to the model.
//! A reply without tool calls ends the loop with its text. Otherwise every
//! call is run in order (later calls may depend on earlier edits) through
//! the loop detector, the tool handler, the receipt builder and the tool
//! log, and its result goes back into the history for the next turn.

use chrono::Utc;
use serde_json::{Map, json};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

use workshop_core::error::{Error, Result};
use workshop_core::event::WorkshopEvent;
use workshop_core::llm::ToolDefinition;
use workshop_core::message::{ChatMessage, ConversationEntry, ToolCall, next_message_id};
use workshop_core::tool::ToolHandler;
use workshop_workbench::ToolLogEntry;

use crate::env::RunEnv;
use crate::loop_detector::{LoopDetector, LoopVerdict};

/// What one phase asks of the loop.
#[derive(Debug, Clone)]
pub struct PhaseRequest {
    /// Phase name used in logs and rate-limit warnings.
    pub phase: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_turns: usize,
    /// Write assistant turns and tool results into the conversation log.
    pub persist_to_conversation: bool,
    /// Forward streamed text to observers as it arrives.
    pub emit_stream_deltas: bool,
}

impl PhaseRequest {
    pub fn new(phase: impl Into<String>, messages: Vec<ChatMessage>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            phase: phase.into(),
            messages,
            tools,
            max_turns: 200,
            persist_to_conversation: false,
            emit_stream_deltas: false,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn persisted(mut self) -> Self {
        self.persist_to_conversation = true;
        self
    }

    /// Streamed text does not rescue a loop that runs out of turns: without a
    /// tool-free final turn the phase still fails.
    pub fn streamed(mut self) -> Self {
        self.emit_stream_deltas = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub final_text: String,
    pub turns: usize,
    pub tool_calls: usize,
    /// Id of the final assistant message (only persisted when requested).
    pub message_id: String,
}

pub struct AgentLoop<'a> {
    env: &'a RunEnv,
    handler: &'a dyn ToolHandler,
}

impl<'a> AgentLoop<'a> {
    pub fn new(env: &'a RunEnv, handler: &'a dyn ToolHandler) -> Self {
        Self { env, handler }
    }

    pub async fn run(&self, request: PhaseRequest) -> Result<LoopOutcome> {
        let env = self.env;
        let PhaseRequest {
            phase,
            mut messages,
            tools,
            max_turns,
            persist_to_conversation,
            emit_stream_deltas,
        } = request;
        let message_id = next_message_id("a");
        let max_calls = env.config.agent.max_tool_calls_per_turn;
        let mut detector = LoopDetector::new(&env.config.loop_detection);
        let streamed = Mutex::new(String::new());
        let started = Instant::now();
        let mut total_calls = 0usize;
        let mut final_text = None;
        let mut turns = 0usize;

        info!(workbench_id = %env.workbench_id, phase = %phase, message_id = %message_id, max_turns, "Agent loop started");

        let on_delta = |delta: &str| {
            if !emit_stream_deltas {
                return;
            }
            streamed
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push_str(delta);
            env.stream_delta(&message_id, delta);
        };

        for turn in 0..max_turns {
            turns = turn + 1;
            debug!(workbench_id = %env.workbench_id, phase = %phase, turn, messages = messages.len(), "Agent loop turn");

            let reply = env
                .retry_policy()
                .run(&env.retry_scope(&phase), || {
                    env.llm
                        .stream_chat_with_tools(env.model_name(), &messages, &tools, &on_delta)
                })
                .await
                .inspect_err(|e| {
                    warn!(workbench_id = %env.workbench_id, phase = %phase, turn, error = %e, "Model request failed");
                })?;

            if reply.tool_calls.is_empty() {
                final_text = Some(reply.content.trim().to_string());
                break;
            }

            let mut calls = reply.tool_calls;
            if calls.len() > max_calls {
                warn!(workbench_id = %env.workbench_id, requested = calls.len(), max_calls, "Tool calls per turn capped");
                calls.truncate(max_calls);
            }
            messages.push(ChatMessage::assistant_with_tools(reply.content.clone(), calls.clone()));

            if persist_to_conversation {
                env.clutter.clear(&env.workbench_id);
                let mut metadata = Map::new();
                metadata.insert("tool_calls".into(), serde_json::to_value(&calls)?);
                let entry = ConversationEntry::assistant(next_message_id("a"), reply.content.clone())
                    .with_metadata(metadata);
                if let Err(e) = env.append_conversation(&entry) {
                    warn!(workbench_id = %env.workbench_id, error = %e, "Failed to persist assistant tool turn");
                }
            }

            for call in &calls {
                match detector.observe(call) {
                    LoopVerdict::Stop => {
                        warn!(workbench_id = %env.workbench_id, phase = %phase, tool = %call.name, turn, "Loop detector hard stop");
                        return Err(Error::LoopDetected(format!(
                            "repeated identical tool call detected: {} (hard stop after {}+ identical calls in last {})",
                            call.name,
                            detector.stop_threshold(),
                            detector.window()
                        )));
                    }
                    LoopVerdict::Warn => {
                        warn!(workbench_id = %env.workbench_id, phase = %phase, tool = %call.name, turn, "Possible tool call loop");
                        env.notify(WorkshopEvent::AgentLoopWarning {
                            workbench_id: env.workbench_id.clone(),
                            tool_name: call.name.clone(),
                            turn,
                        });
                    }
                    LoopVerdict::Proceed => {}
                }

                let receipt = self.execute_call(call, persist_to_conversation).await?;
                messages.push(ChatMessage::tool_result(call.id.clone(), receipt));
                total_calls += 1;
            }
        }

        let streamed = streamed.into_inner().unwrap_or_else(|p| p.into_inner());
        let Some(final_text) = final_text else {
            warn!(
                workbench_id = %env.workbench_id,
                phase = %phase,
                max_turns,
                tool_calls = total_calls,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Agent loop exhausted its turns"
            );
            return Err(Error::LoopDetected(format!(
                "agent reached maximum turn limit ({max_turns}) without completing"
            )));
        };
        // Streamed text spans every turn, tool turns included.
        let final_text = if streamed.trim().is_empty() {
            final_text
        } else {
            streamed.trim().to_string()
        };

        if persist_to_conversation {
            env.clutter.clear(&env.workbench_id);
            env.append_conversation(&ConversationEntry::assistant(message_id.clone(), final_text.clone()))?;
            env.notify(WorkshopEvent::AssistantMessageComplete {
                workbench_id: env.workbench_id.clone(),
                message_id: message_id.clone(),
            });
        }

        info!(
            workbench_id = %env.workbench_id,
            phase = %phase,
            turns,
            tool_calls = total_calls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Agent loop complete"
        );
        Ok(LoopOutcome {
            final_text,
            turns,
            tool_calls: total_calls,
            message_id,
        })
    }

    /// Run one tool call, log it, and return what the model gets to see.
    async fn execute_call(&self, call: &ToolCall, persist: bool) -> Result<String> {
        let env = self.env;
        env.notify(WorkshopEvent::ToolExecuting {
            workbench_id: env.workbench_id.clone(),
            tool_name: call.name.clone(),
            tool_call_id: call.id.clone(),
        });

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = env.cancel.cancelled() => return Err(Error::Canceled),
            outcome = self.handler.execute(call) => outcome,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let (result, error) = match outcome {
            Ok(result) => (result, None),
            Err(e) => {
                warn!(workbench_id = %env.workbench_id, tool = %call.name, error = %e, "Tool call failed");
                (format!("Error: {e}"), Some(e.to_string()))
            }
        };
        let success = error.is_none();

        let entry_id = env.tool_log.reserve_id();
        let receipt = env.receipts().build(&call.name, &result, entry_id);
        debug!(
            workbench_id = %env.workbench_id,
            tool = %call.name,
            entry_id,
            elapsed_ms,
            result_bytes = result.len(),
            receipt_bytes = receipt.len(),
            "Tool call complete"
        );
        env.tool_log.append_or_warn(&ToolLogEntry {
            id: entry_id,
            tool: call.name.clone(),
            args: call.arguments.clone(),
            result,
            receipt: receipt.clone(),
            ts: Utc::now().to_rfc3339(),
            elapsed_ms,
            error,
            metadata: None,
        });

        if persist {
            let metadata = json!({
                "tool_call_id": call.id,
                "tool_name": call.name,
                "success": success,
                "tool_log_entry": entry_id,
            });
            let entry = ConversationEntry::tool_result(next_message_id("tr"), receipt.clone())
                .with_metadata(metadata.as_object().cloned().unwrap_or_default());
            if let Err(e) = env.append_conversation(&entry) {
                warn!(workbench_id = %env.workbench_id, error = %e, "Failed to persist tool result");
            }
        }

        env.notify(WorkshopEvent::ToolComplete {
            workbench_id: env.workbench_id.clone(),
            tool_name: call.name.clone(),
            tool_call_id: call.id.clone(),
            success,
        });
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use workshop_core::error::{LlmError, ToolError};
    use workshop_core::message::Role;
    use workshop_core::tool::FocusHint;
    use workshop_workbench::ConversationLog;

    use crate::testing::{ScriptedLlm, TestBench, call};

    /// Echoes arguments back; `fail` always errors.
    #[derive(Default)]
    struct EchoHandler {
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn execute(&self, call: &ToolCall) -> std::result::Result<String, ToolError> {
            self.executed.lock().unwrap().push(call.name.clone());
            if call.name == "fail" {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "fail".into(),
                    reason: "boom".into(),
                });
            }
            Ok(format!("ran {}", call.arguments))
        }

        fn focus_hints(&self) -> HashMap<String, FocusHint> {
            HashMap::new()
        }
    }

    fn request() -> PhaseRequest {
        PhaseRequest::new("research", vec![ChatMessage::user("go")], Vec::new()).with_max_turns(30)
    }

    #[tokio::test]
    async fn tool_turn_then_text() {
        let bench = TestBench::new(&[]);
        let llm = Arc::new(
            ScriptedLlm::new()
                .calls(vec![call("c1", "read_file", r#"{"path":"a.txt"}"#)])
                .text("  findings  "),
        );
        let env = bench.env(llm.clone());
        let handler = EchoHandler::default();

        let outcome = AgentLoop::new(&env, &handler).run(request()).await.unwrap();
        assert_eq!(outcome.final_text, "findings");
        assert_eq!(outcome.turns, 2);
        assert_eq!(outcome.tool_calls, 1);

        // The second request carries the assistant turn and the tool result.
        let second = &llm.requests()[1];
        assert_eq!(second[1].tool_calls.len(), 1);
        assert_eq!(second[2].role, Role::Tool);
        assert_eq!(second[2].content, r#"ran {"path":"a.txt"}"#);

        let log = env.tool_log.entries();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, 1);
        assert_eq!(log[0].tool, "read_file");
        assert_eq!(
            bench.notifier.names(),
            vec!["WorkshopToolExecuting", "WorkshopToolComplete"]
        );
    }

    #[tokio::test]
    async fn tool_errors_are_reported_to_the_model() {
        let bench = TestBench::new(&[]);
        let llm = Arc::new(ScriptedLlm::new().calls(vec![call("c1", "fail", "{}")]).text("ok"));
        let env = bench.env(llm.clone());

        AgentLoop::new(&env, &EchoHandler::default()).run(request()).await.unwrap();
        let entry = &env.tool_log.entries()[0];
        assert_eq!(entry.error.as_deref(), Some("fail failed: boom"));
        assert_eq!(entry.result, "Error: fail failed: boom");
        assert_eq!(llm.requests()[1][2].content, "Error: fail failed: boom");
        assert_eq!(
            bench.notifier.named("WorkshopToolComplete")[0].payload()["success"],
            false
        );
    }

    #[tokio::test]
    async fn hard_stop_before_sixth_identical_call() {
        let bench = TestBench::new(&[]);
        let same = || call("c", "list_files", "{}");
        let mut llm = ScriptedLlm::new();
        for _ in 0..8 {
            llm = llm.calls(vec![same()]);
        }
        let env = bench.env(Arc::new(llm));
        let handler = EchoHandler::default();

        let err = AgentLoop::new(&env, &handler).run(request()).await.unwrap_err();
        assert!(matches!(err, Error::LoopDetected(_)));
        assert!(err.to_string().contains("hard stop after 5+ identical calls in last 10"));
        assert_eq!(handler.executed.lock().unwrap().len(), 4);
        assert_eq!(bench.notifier.named("WorkshopAgentLoopWarning").len(), 2);
    }

    #[tokio::test]
    async fn turn_cap_is_terminal() {
        let bench = TestBench::new(&[]);
        let llm = ScriptedLlm::new()
            .calls(vec![call("c1", "read_file", r#"{"path":"a"}"#)])
            .calls(vec![call("c2", "read_file", r#"{"path":"b"}"#)]);
        let env = bench.env(Arc::new(llm));

        let err = AgentLoop::new(&env, &EchoHandler::default())
            .run(request().with_max_turns(2))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Agent loop detected: agent reached maximum turn limit (2) without completing"
        );
    }

    #[tokio::test]
    async fn streamed_text_does_not_rescue_the_turn_cap() {
        let bench = TestBench::new(&[]);
        let llm = ScriptedLlm::new().tool_reply(ChatMessage::assistant_with_tools(
            "Checking a first.",
            vec![call("c1", "read_file", r#"{"path":"a"}"#)],
        ));
        let env = bench.env(Arc::new(llm));

        let err = AgentLoop::new(&env, &EchoHandler::default())
            .run(request().streamed().with_max_turns(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LoopDetected(_)));
        assert_eq!(bench.notifier.named("WorkshopAssistantStreamDelta").len(), 1);
    }

    #[tokio::test]
    async fn calls_per_turn_are_capped() {
        let mut bench = TestBench::new(&[]);
        bench.config.agent.max_tool_calls_per_turn = 2;
        let calls = (0..4)
            .map(|i| call(&format!("c{i}"), "read_file", &format!(r#"{{"path":"f{i}"}}"#)))
            .collect();
        let env = bench.env(Arc::new(ScriptedLlm::new().calls(calls)));
        let outcome = AgentLoop::new(&env, &EchoHandler::default())
            .run(request())
            .await
            .unwrap();
        assert_eq!(outcome.tool_calls, 2);
    }

    #[tokio::test]
    async fn unauthorized_fails_without_retry() {
        let bench = TestBench::new(&[]);
        let llm = Arc::new(ScriptedLlm::new().tool_error(LlmError::Unauthorized("bad key".into())));
        let env = bench.env(llm);
        let err = AgentLoop::new(&env, &EchoHandler::default())
            .run(request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Llm(LlmError::Unauthorized(_))));
        assert!(bench.sleeper.secs().is_empty());
    }

    #[tokio::test]
    async fn canceled_run_stops_before_the_model_call() {
        let bench = TestBench::new(&[]);
        let llm = Arc::new(ScriptedLlm::new().text("never"));
        let env = bench.env(llm.clone());
        env.cancel.cancel();
        let err = AgentLoop::new(&env, &EchoHandler::default())
            .run(request())
            .await
            .unwrap_err();
        assert!(err.is_canceled());
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn persisted_stream_writes_conversation() {
        let bench = TestBench::new(&[]);
        let llm = Arc::new(
            ScriptedLlm::new()
                .calls(vec![call("c1", "list_files", "{}")])
                .text("All done."),
        );
        let env = bench.env(llm);
        let outcome = AgentLoop::new(&env, &EchoHandler::default())
            .run(request().persisted().streamed())
            .await
            .unwrap();
        assert_eq!(outcome.final_text, "All done.");

        let entries = ConversationLog::open(&bench.layout()).read().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].metadata.as_ref().unwrap().contains_key("tool_calls"));
        assert_eq!(entries[1].metadata_str("tool_call_id"), Some("c1"));
        assert_eq!(entries[1].metadata.as_ref().unwrap()["tool_log_entry"], 1);
        assert_eq!(entries[2].message_id, outcome.message_id);
        assert_eq!(entries[2].text, "All done.");
        assert_eq!(bench.notifier.named("WorkshopAssistantStreamDelta").len(), 1);
        assert_eq!(bench.notifier.named("WorkshopAssistantMessageComplete").len(), 1);
    }
}
