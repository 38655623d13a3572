//! Per-message draft revisions used by undo and regenerate.
//!
//! Every user or assistant message records what the draft looked like at
//! that point. Undoing to the message puts that draft back (or removes the
//! draft if there was none).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use workshop_core::error::StoreError;
use workshop_core::layout::WorkbenchLayout;
use workshop_core::store::DraftState;

use crate::fsutil::{copy_dir_all, copy_file_if_exists, read_json_opt, remove_if_exists, swap_dir, write_json_atomic};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRevision {
    pub revision_id: String,
    pub message_id: String,
    pub created_at: String,
    pub has_draft: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<String>,
}

fn staging_sibling(dir: &std::path::Path) -> PathBuf {
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(".staging");
    dir.with_file_name(name)
}

fn current_draft(layout: &WorkbenchLayout) -> Result<Option<DraftState>, StoreError> {
    if !layout.draft_dir().is_dir() {
        return Ok(None);
    }
    Ok(read_json_opt(&layout.draft_meta())?)
}

/// Snapshot the current draft for `message_id`, replacing any earlier
/// snapshot for the same message.
pub fn record(layout: &WorkbenchLayout, message_id: &str) -> Result<DraftRevision, StoreError> {
    let dir = layout.draft_revision_dir(message_id);
    let staging = staging_sibling(&dir);
    remove_if_exists(&staging)?;
    fs::create_dir_all(&staging)?;

    let draft = current_draft(layout)?;
    if let Some(state) = &draft {
        copy_dir_all(&layout.draft_dir(), &staging.join("draft_snapshot"))?;
        copy_file_if_exists(&layout.draft_meta(), &staging.join("draft.json"))?;
        let review = layout.review_dir(&state.draft_id);
        if review.is_dir() {
            copy_dir_all(&review, &staging.join("review_snapshot"))?;
        }
    }

    let revision = DraftRevision {
        revision_id: dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        message_id: message_id.to_string(),
        created_at: Utc::now().to_rfc3339(),
        has_draft: draft.is_some(),
        draft_id: draft.map(|d| d.draft_id),
    };
    write_json_atomic(&staging.join("rev.json"), &revision)?;

    remove_if_exists(&dir)?;
    fs::rename(&staging, &dir)?;
    debug!(message_id, has_draft = revision.has_draft, "Draft revision recorded");
    Ok(revision)
}

pub fn load(layout: &WorkbenchLayout, message_id: &str) -> Result<Option<DraftRevision>, StoreError> {
    Ok(read_json_opt(&layout.draft_revision_dir(message_id).join("rev.json"))?)
}

/// Put the draft back the way it was recorded for `message_id`.
pub fn restore(layout: &WorkbenchLayout, message_id: &str) -> Result<DraftRevision, StoreError> {
    let dir = layout.draft_revision_dir(message_id);
    let revision = load(layout, message_id)?
        .ok_or_else(|| StoreError::NotFound(format!("draft revision for message {message_id}")))?;

    if let Some(current) = current_draft(layout)? {
        remove_if_exists(&layout.review_dir(&current.draft_id))?;
    }

    if !revision.has_draft {
        remove_if_exists(&layout.draft_dir())?;
        remove_if_exists(&layout.draft_meta())?;
        debug!(message_id, "Draft removed by revision restore");
        return Ok(revision);
    }

    let snapshot = dir.join("draft_snapshot");
    let tmp = layout.root().join("draft.restore_tmp");
    remove_if_exists(&tmp)?;
    if snapshot.is_dir() {
        copy_dir_all(&snapshot, &tmp)?;
    } else {
        fs::create_dir_all(&tmp)?;
    }
    if let Err(e) = swap_dir(&layout.draft_dir(), &tmp) {
        let _ = remove_if_exists(&tmp);
        return Err(e.into());
    }
    copy_file_if_exists(&dir.join("draft.json"), &layout.draft_meta())?;

    if let Some(draft_id) = &revision.draft_id {
        let review = layout.review_dir(draft_id);
        remove_if_exists(&review)?;
        let review_snapshot = dir.join("review_snapshot");
        if review_snapshot.is_dir() {
            copy_dir_all(&review_snapshot, &review)?;
        }
    }
    debug!(message_id, "Draft revision restored");
    Ok(revision)
}
