//! Test doubles shared by the tool tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tempfile::TempDir;

use workshop_core::error::ToolError;
use workshop_core::store::WorkbenchStore;
use workshop_core::tool::ToolWorker;
use workshop_workbench::FsWorkbenchStore;

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

    /// Params of every call made to `method`, in order.
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

/// A store with one workbench whose published area holds `files`.
pub fn workbench_with(files: &[(&str, &str)]) -> (TempDir, FsWorkbenchStore, String) {
    let dir = TempDir::new().unwrap();
    let store = FsWorkbenchStore::new(dir.path());
    let wb = store.create_workbench("test", "openai:gpt-4o").unwrap();
    let published = store.layout(&wb.id).unwrap().published_dir();
    for (name, content) in files {
        std::fs::write(published.join(name), content).unwrap();
    }
    (dir, store, wb.id)
}
