//! Filesystem-backed [`WorkbenchStore`].
//!
//! Each workbench is a directory under the store root:
//!
//! ```text
//! <root>/<workbench_id>/
//!   workbench.json
//!   published/
//!   draft/                   (only while a draft is open)
//!   draft.<name>.staging/    (only while a proposal is being applied)
//!   meta/
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use workshop_core::error::StoreError;
use workshop_core::layout::WorkbenchLayout;
use workshop_core::store::{Area, CheckpointInfo, DraftState, FileEntry, FileKind, WorkbenchStore};

use crate::checkpoints;
use crate::fsutil::{atomic_write, copy_dir_all, read_json_opt, remove_if_exists, swap_dir, write_json_atomic};
use crate::sandbox::{base_name, validate_flat_path, validate_text_write};

/// Workbench descriptor stored in `workbench.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbench {
    pub id: String,
    pub name: String,
    pub created_at: String,
    #[serde(default)]
    pub default_model_id: String,
}

pub struct FsWorkbenchStore {
    root: PathBuf,
}

impl FsWorkbenchStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_workbench(&self, name: &str, default_model_id: &str) -> Result<Workbench, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidPath("workbench name is empty".into()));
        }
        let workbench = Workbench {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now().to_rfc3339(),
            default_model_id: default_model_id.to_string(),
        };
        let layout = WorkbenchLayout::new(self.root.join(&workbench.id));
        fs::create_dir_all(layout.published_dir())?;
        fs::create_dir_all(layout.meta_dir())?;
        write_json_atomic(&layout.manifest(), &workbench)?;
        info!(workbench_id = %workbench.id, name, "Workbench created");
        Ok(workbench)
    }

    pub fn get_workbench(&self, workbench_id: &str) -> Result<Workbench, StoreError> {
        let layout = self.layout(workbench_id)?;
        read_json_opt(&layout.manifest())?
            .ok_or_else(|| StoreError::NotFound(format!("workbench {workbench_id}")))
    }

    pub fn list_workbenches(&self) -> Result<Vec<Workbench>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let manifest = path.join("workbench.json");
            if let Some(wb) = read_json_opt::<Workbench>(&manifest)? {
                out.push(wb);
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    /// Copy an external file into `published/` under its base name.
    pub fn import_file(&self, workbench_id: &str, source: &Path) -> Result<String, StoreError> {
        let name = base_name(&source.to_string_lossy());
        let name = validate_flat_path(&name)?.to_string();
        let layout = self.layout(workbench_id)?;
        let data = fs::read(source)?;
        atomic_write(&layout.published_dir().join(&name), &data)?;
        debug!(workbench_id, path = %name, "File imported");
        Ok(name)
    }

    fn active_dir(&self, layout: &WorkbenchLayout) -> PathBuf {
        let draft = layout.draft_dir();
        if draft.is_dir() { draft } else { layout.published_dir() }
    }

    fn validate_staging_name(name: &str) -> Result<(), StoreError> {
        validate_flat_path(name)?;
        if !name.starts_with("draft.") || !name.ends_with(".staging") {
            return Err(StoreError::InvalidPath(format!("invalid staging area: {name}")));
        }
        Ok(())
    }
}

fn is_listed(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(".tmp")
}

fn list_area(dir: &Path) -> Result<Vec<FileEntry>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !meta.is_file() || !is_listed(&name) {
            continue;
        }
        let modified_at = meta
            .modified()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
            .unwrap_or_default();
        let kind = FileKind::for_path(&name);
        files.push(FileEntry {
            size: meta.len(),
            modified_at,
            file_kind: kind,
            mime_type: kind.mime_type(&name).to_string(),
            is_opaque: kind.is_opaque(),
            path: name,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

impl WorkbenchStore for FsWorkbenchStore {
    fn workbench_dir(&self, workbench_id: &str) -> Result<PathBuf, StoreError> {
        validate_flat_path(workbench_id)?;
        let dir = self.root.join(workbench_id);
        if !dir.is_dir() {
            return Err(StoreError::NotFound(format!("workbench {workbench_id}")));
        }
        Ok(dir)
    }

    fn files_list(&self, workbench_id: &str) -> Result<Vec<FileEntry>, StoreError> {
        let layout = self.layout(workbench_id)?;
        list_area(&self.active_dir(&layout))
    }

    fn read_file(&self, workbench_id: &str, area: &Area, path: &str) -> Result<String, StoreError> {
        let name = validate_flat_path(path)?;
        let file = self.area_dir(workbench_id, area)?.join(name);
        match fs::read(&file) {
            Ok(data) => Ok(String::from_utf8_lossy(&data).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply_write_to_area(
        &self,
        workbench_id: &str,
        area: &Area,
        path: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let name = validate_text_write(path)?;
        let dir = self.area_dir(workbench_id, area)?;
        if !dir.is_dir() {
            return Err(StoreError::NotFound(format!("area {}", area.dir_name())));
        }
        atomic_write(&dir.join(name), content.as_bytes())?;
        Ok(())
    }

    fn draft_state(&self, workbench_id: &str) -> Result<Option<DraftState>, StoreError> {
        let layout = self.layout(workbench_id)?;
        if !layout.draft_dir().is_dir() {
            return Ok(None);
        }
        Ok(read_json_opt(&layout.draft_meta())?)
    }

    fn create_draft(
        &self,
        workbench_id: &str,
        source_kind: &str,
        source_ref: &str,
    ) -> Result<DraftState, StoreError> {
        if let Some(existing) = self.draft_state(workbench_id)? {
            return Ok(existing);
        }
        let layout = self.layout(workbench_id)?;
        let tmp = layout.root().join("draft.create_tmp");
        remove_if_exists(&tmp)?;
        copy_dir_all(&layout.published_dir(), &tmp)?;
        remove_if_exists(&layout.draft_dir())?;
        fs::rename(&tmp, layout.draft_dir())?;

        let state = DraftState {
            draft_id: Uuid::new_v4().simple().to_string()[..16].to_string(),
            created_at: Utc::now().to_rfc3339(),
            source_kind: source_kind.to_string(),
            source_ref: source_ref.to_string(),
        };
        write_json_atomic(&layout.draft_meta(), &state)?;
        info!(workbench_id, draft_id = %state.draft_id, source_kind, "Draft created");
        Ok(state)
    }

    fn discard_draft(&self, workbench_id: &str) -> Result<(), StoreError> {
        let layout = self.layout(workbench_id)?;
        if let Some(state) = read_json_opt::<DraftState>(&layout.draft_meta())? {
            remove_if_exists(&layout.review_dir(&state.draft_id))?;
        }
        remove_if_exists(&layout.draft_dir())?;
        remove_if_exists(&layout.draft_meta())?;
        for entry in fs::read_dir(layout.root())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("draft.") && name.ends_with(".staging") {
                remove_if_exists(&entry.path())?;
            }
        }
        info!(workbench_id, "Draft discarded");
        Ok(())
    }

    fn publish_draft(&self, workbench_id: &str) -> Result<(), StoreError> {
        let state = self.draft_state(workbench_id)?.ok_or(StoreError::DraftMissing)?;
        let layout = self.layout(workbench_id)?;
        swap_dir(&layout.published_dir(), &layout.draft_dir())?;
        remove_if_exists(&layout.draft_meta())?;
        remove_if_exists(&layout.review_dir(&state.draft_id))?;
        info!(workbench_id, draft_id = %state.draft_id, "Draft published");
        Ok(())
    }

    fn create_draft_staging(&self, workbench_id: &str, name: &str) -> Result<(), StoreError> {
        Self::validate_staging_name(name)?;
        let layout = self.layout(workbench_id)?;
        let draft = layout.draft_dir();
        if !draft.is_dir() {
            return Err(StoreError::DraftMissing);
        }
        let staging = layout.staging_dir(name);
        remove_if_exists(&staging)?;
        copy_dir_all(&draft, &staging)?;
        debug!(workbench_id, staging = name, "Staging area created");
        Ok(())
    }

    fn commit_draft_staging(&self, workbench_id: &str, name: &str) -> Result<(), StoreError> {
        Self::validate_staging_name(name)?;
        let layout = self.layout(workbench_id)?;
        let staging = layout.staging_dir(name);
        if !staging.is_dir() {
            return Err(StoreError::NotFound(format!("staging area {name}")));
        }
        swap_dir(&layout.draft_dir(), &staging)?;
        debug!(workbench_id, staging = name, "Staging committed");
        Ok(())
    }

    fn remove_draft_staging(&self, workbench_id: &str, name: &str) -> Result<(), StoreError> {
        Self::validate_staging_name(name)?;
        let layout = self.layout(workbench_id)?;
        remove_if_exists(&layout.staging_dir(name))?;
        Ok(())
    }

    fn compute_scope_hash(&self, workbench_id: &str) -> Result<String, StoreError> {
        let mut hasher = Sha256::new();
        for file in self.files_list(workbench_id)? {
            hasher.update(format!("{}|{}|{}\n", file.path, file.size, file.modified_at));
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn checkpoint_create(
        &self,
        workbench_id: &str,
        reason: &str,
        description: &str,
    ) -> Result<CheckpointInfo, StoreError> {
        checkpoints::create(&self.layout(workbench_id)?, reason, description)
    }

    fn checkpoint_restore(&self, workbench_id: &str, checkpoint_id: &str) -> Result<(), StoreError> {
        checkpoints::restore(&self.layout(workbench_id)?, checkpoint_id, true)
    }

    fn checkpoint_restore_published(
        &self,
        workbench_id: &str,
        checkpoint_id: &str,
    ) -> Result<(), StoreError> {
        checkpoints::restore(&self.layout(workbench_id)?, checkpoint_id, false)
    }

    fn checkpoints_list(&self, workbench_id: &str) -> Result<Vec<CheckpointInfo>, StoreError> {
        checkpoints::list(&self.layout(workbench_id)?)
    }
}
