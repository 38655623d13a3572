//! Checkpoint snapshots of published files and conversation state.
//!
//! ```text
//! meta/checkpoints/<id>.json
//! meta/checkpoints/<id>/published_snapshot/
//! meta/checkpoints/<id>/meta_snapshot/{conversation.jsonl, workshop_state.json}
//! ```

use chrono::Utc;
use std::fs;
use tracing::{debug, info};
use uuid::Uuid;

use workshop_core::error::StoreError;
use workshop_core::layout::WorkbenchLayout;
use workshop_core::store::CheckpointInfo;

use crate::fsutil::{copy_dir_all, copy_file_if_exists, read_json_opt, remove_if_exists, swap_dir, write_json_atomic};

const META_FILES: &[&str] = &["conversation.jsonl", "workshop_state.json"];

fn new_checkpoint_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

fn validate_checkpoint_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(StoreError::InvalidPath(format!("invalid checkpoint id: {id}")));
    }
    Ok(())
}

pub fn create(
    layout: &WorkbenchLayout,
    reason: &str,
    description: &str,
) -> Result<CheckpointInfo, StoreError> {
    let id = new_checkpoint_id();
    let dir = layout.checkpoints_dir().join(&id);
    fs::create_dir_all(&dir)?;

    let published = layout.published_dir();
    let published_snapshot = dir.join("published_snapshot");
    if published.is_dir() {
        copy_dir_all(&published, &published_snapshot)?;
    } else {
        fs::create_dir_all(&published_snapshot)?;
    }

    let meta_snapshot = dir.join("meta_snapshot");
    fs::create_dir_all(&meta_snapshot)?;
    for name in META_FILES {
        copy_file_if_exists(&layout.meta_dir().join(name), &meta_snapshot.join(name))?;
    }

    let info = CheckpointInfo {
        checkpoint_id: id.clone(),
        reason: reason.to_string(),
        description: description.to_string(),
        created_at: Utc::now().to_rfc3339(),
    };
    write_json_atomic(&layout.checkpoints_dir().join(format!("{id}.json")), &info)?;
    info!(checkpoint_id = %id, reason, "Checkpoint created");
    Ok(info)
}

/// Restore a checkpoint. `include_meta` also puts back the conversation
/// log and workshop state captured with it.
pub fn restore(
    layout: &WorkbenchLayout,
    checkpoint_id: &str,
    include_meta: bool,
) -> Result<(), StoreError> {
    validate_checkpoint_id(checkpoint_id)?;
    let dir = layout.checkpoints_dir().join(checkpoint_id);
    let snapshot = dir.join("published_snapshot");
    if !snapshot.is_dir() {
        return Err(StoreError::NotFound(format!("checkpoint {checkpoint_id}")));
    }

    let tmp = layout.root().join("published.restore_tmp");
    remove_if_exists(&tmp)?;
    copy_dir_all(&snapshot, &tmp)?;
    if let Err(e) = swap_dir(&layout.published_dir(), &tmp) {
        let _ = remove_if_exists(&tmp);
        return Err(e.into());
    }

    if include_meta {
        let meta_snapshot = dir.join("meta_snapshot");
        for name in META_FILES {
            let target = layout.meta_dir().join(name);
            if !copy_file_if_exists(&meta_snapshot.join(name), &target)? {
                remove_if_exists(&target)?;
            }
        }
    }
    debug!(checkpoint_id, include_meta, "Checkpoint restored");
    Ok(())
}

/// All checkpoints, newest first.
pub fn list(layout: &WorkbenchLayout) -> Result<Vec<CheckpointInfo>, StoreError> {
    let dir = layout.checkpoints_dir();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(info) = read_json_opt::<CheckpointInfo>(&path)? {
            out.push(info);
        }
    }
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (tempfile::TempDir, WorkbenchLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkbenchLayout::new(dir.path());
        fs::create_dir_all(layout.published_dir()).unwrap();
        fs::create_dir_all(layout.meta_dir()).unwrap();
        (dir, layout)
    }

    #[test]
    fn create_then_restore_published_and_meta() {
        let (_dir, layout) = layout();
        fs::write(layout.published_dir().join("a.txt"), "v1").unwrap();
        fs::write(layout.conversation(), "{\"message_id\":\"u-1\"}\n").unwrap();

        let cp = create(&layout, "manual", "first").unwrap();
        assert_eq!(cp.checkpoint_id.len(), 16);

        fs::write(layout.published_dir().join("a.txt"), "v2").unwrap();
        fs::write(layout.published_dir().join("b.txt"), "new").unwrap();
        fs::write(layout.conversation(), "").unwrap();

        restore(&layout, &cp.checkpoint_id, true).unwrap();
        assert_eq!(fs::read_to_string(layout.published_dir().join("a.txt")).unwrap(), "v1");
        assert!(!layout.published_dir().join("b.txt").exists());
        assert!(fs::read_to_string(layout.conversation()).unwrap().contains("u-1"));
        assert!(!layout.root().join("published.prev").exists());
        assert!(!layout.root().join("published.restore_tmp").exists());
    }

    #[test]
    fn published_only_restore_keeps_conversation() {
        let (_dir, layout) = layout();
        fs::write(layout.conversation(), "old\n").unwrap();
        let cp = create(&layout, "publish", "Before publish").unwrap();
        fs::write(layout.conversation(), "new\n").unwrap();

        restore(&layout, &cp.checkpoint_id, false).unwrap();
        assert_eq!(fs::read_to_string(layout.conversation()).unwrap(), "new\n");
    }

    #[test]
    fn restore_unknown_checkpoint_is_not_found() {
        let (_dir, layout) = layout();
        assert!(matches!(
            restore(&layout, "deadbeefdeadbeef", true),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            restore(&layout, "../x", true),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn list_is_newest_first() {
        let (_dir, layout) = layout();
        let first = create(&layout, "manual", "one").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = create(&layout, "manual", "two").unwrap();
        let ids: Vec<_> = list(&layout).unwrap().into_iter().map(|c| c.checkpoint_id).collect();
        assert_eq!(ids, vec![second.checkpoint_id, first.checkpoint_id]);
    }
}
