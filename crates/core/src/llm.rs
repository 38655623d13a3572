//! LLM client trait: the one polymorphic capability the engine needs from a
//! model provider.
//!
//! Wire protocols, OAuth and key storage live behind this trait. The engine
//! only distinguishes the error classes in [`LlmError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::message::ChatMessage;

/// A tool schema sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object
    pub parameters: serde_json::Value,
}

/// Callback receiving streamed text deltas.
pub type DeltaSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// The model-facing capability consumed by the agent loop.
///
/// Only `chat` and `chat_with_tools` are required. The streaming variants
/// default to their non-streaming counterparts and emit the whole text as a
/// single delta.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Stable provider id used in notifications (e.g. "openai").
    fn provider_id(&self) -> &str;

    /// Check that a key is accepted by the provider.
    async fn validate_key(&self, _api_key: &str) -> Result<(), LlmError> {
        Ok(())
    }

    /// Plain completion, returns the assistant text.
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, LlmError>;

    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        on_delta: DeltaSink<'_>,
    ) -> Result<String, LlmError> {
        let text = self.chat(model, messages).await?;
        if !text.is_empty() {
            on_delta(&text);
        }
        Ok(text)
    }

    /// Completion with tool schemas. The returned assistant message may carry
    /// tool calls.
    async fn chat_with_tools(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, LlmError>;

    async fn stream_chat_with_tools(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        on_delta: DeltaSink<'_>,
    ) -> Result<ChatMessage, LlmError> {
        let message = self.chat_with_tools(model, messages, tools).await?;
        if !message.content.is_empty() {
            on_delta(&message.content);
        }
        Ok(message)
    }
}
