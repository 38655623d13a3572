//! Small per-workbench state file (`meta/workshop_state.json`).

use serde::{Deserialize, Serialize};

use workshop_core::error::StoreError;
use workshop_core::layout::WorkbenchLayout;

use crate::fsutil::{read_json_opt, write_json_atomic};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopState {
    #[serde(default)]
    pub active_model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_proposal_id: Option<String>,
}

impl WorkshopState {
    pub fn load(layout: &WorkbenchLayout) -> Result<Self, StoreError> {
        Ok(read_json_opt(&layout.workshop_state())?.unwrap_or_default())
    }

    pub fn save(&self, layout: &WorkbenchLayout) -> Result<(), StoreError> {
        write_json_atomic(&layout.workshop_state(), self)?;
        Ok(())
    }

    /// Load, mutate and save in one step.
    pub fn update(
        layout: &WorkbenchLayout,
        f: impl FnOnce(&mut WorkshopState),
    ) -> Result<WorkshopState, StoreError> {
        let mut state = Self::load(layout)?;
        f(&mut state);
        state.save(layout)?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = WorkshopState::load(&WorkbenchLayout::new(dir.path())).unwrap();
        assert_eq!(state, WorkshopState::default());
    }

    #[test]
    fn update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkbenchLayout::new(dir.path());
        WorkshopState::update(&layout, |s| s.pending_proposal_id = Some("p1".into())).unwrap();
        WorkshopState::update(&layout, |s| s.active_model_id = "openai:gpt-4o".into()).unwrap();
        let state = WorkshopState::load(&layout).unwrap();
        assert_eq!(state.pending_proposal_id.as_deref(), Some("p1"));
        assert_eq!(state.active_model_id, "openai:gpt-4o");
    }
}
