//! State shared by all workshop tools of one run.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use workshop_core::error::ToolError;
use workshop_core::store::{Area, DraftState, FileEntry, WorkbenchStore};
use workshop_core::tool::{FocusHint, ToolWorker};

use crate::baseline::ensure_draft_baseline;

/// The workbench a run operates on, its collaborators, and the focus hints
/// collected from edits so far.
pub struct ToolContext {
    workbench_id: String,
    store: Arc<dyn WorkbenchStore>,
    worker: Option<Arc<dyn ToolWorker>>,
    focus_hints: Mutex<HashMap<String, FocusHint>>,
}

impl ToolContext {
    pub fn new(
        workbench_id: impl Into<String>,
        store: Arc<dyn WorkbenchStore>,
        worker: Option<Arc<dyn ToolWorker>>,
    ) -> Self {
        Self {
            workbench_id: workbench_id.into(),
            store,
            worker,
            focus_hints: Mutex::new(HashMap::new()),
        }
    }

    pub fn workbench_id(&self) -> &str {
        &self.workbench_id
    }

    pub fn store(&self) -> &dyn WorkbenchStore {
        self.store.as_ref()
    }

    pub fn worker(&self) -> Result<&dyn ToolWorker, ToolError> {
        self.worker
            .as_deref()
            .ok_or_else(|| ToolError::WorkerUnavailable("tool worker not configured".into()))
    }

    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    pub fn draft_state(&self) -> Result<Option<DraftState>, ToolError> {
        Ok(self.store.draft_state(&self.workbench_id)?)
    }

    /// The area reads come from: the draft when one is open.
    pub fn read_area(&self) -> Result<Area, ToolError> {
        Ok(match self.draft_state()? {
            Some(_) => Area::Draft,
            None => Area::Published,
        })
    }

    /// Worker `root` parameter matching [`read_area`](Self::read_area).
    pub fn read_root(&self) -> Result<&'static str, ToolError> {
        Ok(match self.read_area()? {
            Area::Draft => "draft",
            _ => "published",
        })
    }

    pub fn files(&self) -> Result<Vec<FileEntry>, ToolError> {
        Ok(self.store.files_list(&self.workbench_id)?)
    }

    pub fn find_file(&self, path: &str) -> Result<Option<FileEntry>, ToolError> {
        Ok(self.files()?.into_iter().find(|f| f.path == path))
    }

    /// Open a draft for agent edits if none exists. A new draft gets its
    /// baselines captured before any edit lands.
    pub async fn ensure_draft(&self) -> Result<DraftState, ToolError> {
        if let Some(state) = self.draft_state()? {
            return Ok(state);
        }
        let state = self
            .store
            .create_draft(&self.workbench_id, "workshop", "agent")?;
        info!(workbench_id = %self.workbench_id, draft_id = %state.draft_id, "Draft opened for agent edits");
        ensure_draft_baseline(
            self.store.as_ref(),
            self.worker.as_deref(),
            &self.workbench_id,
            &state.draft_id,
        )
        .await?;
        Ok(state)
    }

    /// Call the worker and render its response for the model. An empty
    /// response reads as `{"ok":true}`.
    pub async fn call_json_worker(&self, method: &str, params: Value) -> Result<String, ToolError> {
        debug!(workbench_id = %self.workbench_id, method, "Worker call");
        let response = self.worker()?.call(method, params).await?;
        let response = match response {
            Value::Null => json!({ "ok": true }),
            Value::Object(ref map) if map.is_empty() => json!({ "ok": true }),
            other => other,
        };
        Ok(response.to_string())
    }

    fn hints(&self) -> MutexGuard<'_, HashMap<String, FocusHint>> {
        self.focus_hints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record where an edit landed. Later edits to the same path replace it.
    pub fn set_focus_hint(&self, path: &str, hint: FocusHint) {
        if path.trim().is_empty() {
            return;
        }
        self.hints().insert(path.to_string(), hint);
    }

    pub fn focus_hints(&self) -> HashMap<String, FocusHint> {
        self.hints().clone()
    }
}
