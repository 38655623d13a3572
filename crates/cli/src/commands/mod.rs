//! Subcommand implementations. Each returns the text to print.

pub mod draft;
pub mod init;
pub mod run_log;
pub mod workbench;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use workshop_agent::Workshop;
use workshop_config::EngineConfig;
use workshop_core::{ChatMessage, LlmClient, LlmError, Notifier, ToolDefinition, WorkshopEvent};
use workshop_workbench::FsWorkbenchStore;

/// Stands in for a provider: the CLI never talks to a model.
struct NoProvider;

#[async_trait]
impl LlmClient for NoProvider {
    fn provider_id(&self) -> &str {
        "none"
    }

    async fn chat(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured("the CLI does not run the agent".into()))
    }

    async fn chat_with_tools(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ChatMessage, LlmError> {
        Err(LlmError::NotConfigured("the CLI does not run the agent".into()))
    }
}

/// Sends engine notifications to the log.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: WorkshopEvent) {
        debug!(event = event.name(), payload = %event.payload(), "Notification");
    }
}

/// The store and the engine over one data directory.
pub struct Engine {
    config: Arc<EngineConfig>,
    store: Arc<FsWorkbenchStore>,
    workshop: Workshop,
}

impl Engine {
    pub fn open(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(FsWorkbenchStore::new(config.workbenches_dir()));
        let workshop = Workshop::new(
            config.clone(),
            store.clone(),
            Arc::new(NoProvider),
            Arc::new(LogNotifier),
        );
        Self {
            config,
            store,
            workshop,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &FsWorkbenchStore {
        &self.store
    }

    pub fn workshop(&self) -> &Workshop {
        &self.workshop
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;
    use workshop_core::WorkbenchStore;

    /// An engine over a fresh data directory with one workbench.
    pub fn engine_with(files: &[(&str, &str)]) -> (TempDir, Engine, String) {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let engine = Engine::open(config);
        let wb = engine.store().create_workbench("Reports", "openai:gpt-4o").unwrap();
        let published = engine.store().layout(&wb.id).unwrap().published_dir();
        for (name, content) in files {
            std::fs::write(published.join(name), content).unwrap();
        }
        (dir, engine, wb.id)
    }
}
