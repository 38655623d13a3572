//! Workbench store trait: published files, the draft layered over them,
//! staging areas and checkpoints.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::StoreError;
use crate::layout::WorkbenchLayout;

/// Coarse file classification by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Docx,
    Odt,
    Xlsx,
    Pptx,
    Pdf,
    Image,
    Binary,
}

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "csv", "md", "json", "xml", "yaml", "yml", "html", "js", "ts", "py", "java", "go", "rb",
    "rs", "c", "cpp", "h", "css", "sql",
];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp"];

impl FileKind {
    pub fn for_path(path: &str) -> FileKind {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "docx" => FileKind::Docx,
            "odt" => FileKind::Odt,
            "xlsx" => FileKind::Xlsx,
            "pptx" => FileKind::Pptx,
            "pdf" => FileKind::Pdf,
            e if TEXT_EXTENSIONS.contains(&e) => FileKind::Text,
            e if IMAGE_EXTENSIONS.contains(&e) => FileKind::Image,
            _ => FileKind::Binary,
        }
    }

    /// Kinds whose review diff compares extracted text.
    pub fn is_structured(self) -> bool {
        matches!(
            self,
            FileKind::Docx | FileKind::Odt | FileKind::Xlsx | FileKind::Pptx | FileKind::Pdf
        )
    }

    /// Kinds the model cannot read as text at all.
    pub fn is_opaque(self) -> bool {
        matches!(self, FileKind::Image | FileKind::Binary)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Text => "text",
            FileKind::Docx => "docx",
            FileKind::Odt => "odt",
            FileKind::Xlsx => "xlsx",
            FileKind::Pptx => "pptx",
            FileKind::Pdf => "pdf",
            FileKind::Image => "image",
            FileKind::Binary => "binary",
        }
    }

    pub fn mime_type(self, path: &str) -> &'static str {
        match self {
            FileKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileKind::Odt => "application/vnd.oasis.opendocument.text",
            FileKind::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            FileKind::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            FileKind::Pdf => "application/pdf",
            FileKind::Image => "image/*",
            FileKind::Binary => "application/octet-stream",
            FileKind::Text if path.to_ascii_lowercase().ends_with(".csv") => "text/csv",
            FileKind::Text => "text/plain",
        }
    }
}

/// One file in the active area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    /// RFC 3339
    pub modified_at: String,
    pub file_kind: FileKind,
    pub mime_type: String,
    #[serde(default)]
    pub is_opaque: bool,
}

/// Persisted draft descriptor (`meta/draft.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftState {
    pub draft_id: String,
    pub created_at: String,
    #[serde(default)]
    pub source_kind: String,
    #[serde(default)]
    pub source_ref: String,
}

/// A file area inside a workbench.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Area {
    Published,
    Draft,
    Staging(String),
}

impl Area {
    /// Name of the area directory under the workbench root.
    pub fn dir_name(&self) -> &str {
        match self {
            Area::Published => "published",
            Area::Draft => "draft",
            Area::Staging(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub checkpoint_id: String,
    pub reason: String,
    pub description: String,
    pub created_at: String,
}

/// The workbench storage capability.
///
/// Filesystem-backed and synchronous; callers inside async code treat each
/// call as a short blocking step. At most one run touches a workbench at a
/// time (enforced by the run registry), so implementations need no locking.
pub trait WorkbenchStore: Send + Sync {
    /// Root directory of a workbench; fails when it does not exist.
    fn workbench_dir(&self, workbench_id: &str) -> Result<PathBuf, StoreError>;

    fn layout(&self, workbench_id: &str) -> Result<WorkbenchLayout, StoreError> {
        Ok(WorkbenchLayout::new(self.workbench_dir(workbench_id)?))
    }

    /// Directory of an area, for collaborators that operate on files directly.
    fn area_dir(&self, workbench_id: &str, area: &Area) -> Result<PathBuf, StoreError> {
        Ok(self.workbench_dir(workbench_id)?.join(area.dir_name()))
    }

    /// Files in the draft if one exists, otherwise in published.
    fn files_list(&self, workbench_id: &str) -> Result<Vec<FileEntry>, StoreError>;

    fn read_file(&self, workbench_id: &str, area: &Area, path: &str) -> Result<String, StoreError>;

    /// Write a text file into an area after validating the flat path and
    /// extension. The write is atomic.
    fn apply_write_to_area(
        &self,
        workbench_id: &str,
        area: &Area,
        path: &str,
        content: &str,
    ) -> Result<(), StoreError>;

    fn draft_state(&self, workbench_id: &str) -> Result<Option<DraftState>, StoreError>;

    /// Create a draft by copying published. Returns the existing draft when
    /// one is already open.
    fn create_draft(
        &self,
        workbench_id: &str,
        source_kind: &str,
        source_ref: &str,
    ) -> Result<DraftState, StoreError>;

    fn discard_draft(&self, workbench_id: &str) -> Result<(), StoreError>;

    fn publish_draft(&self, workbench_id: &str) -> Result<(), StoreError>;

    /// Copy the draft into a fresh staging area.
    fn create_draft_staging(&self, workbench_id: &str, name: &str) -> Result<(), StoreError>;

    /// Atomically replace the draft with the staging area.
    fn commit_draft_staging(&self, workbench_id: &str, name: &str) -> Result<(), StoreError>;

    fn remove_draft_staging(&self, workbench_id: &str, name: &str) -> Result<(), StoreError>;

    /// Hash over the active area's file list (path, size, mtime).
    fn compute_scope_hash(&self, workbench_id: &str) -> Result<String, StoreError>;

    fn checkpoint_create(
        &self,
        workbench_id: &str,
        reason: &str,
        description: &str,
    ) -> Result<CheckpointInfo, StoreError>;

    /// Restore published files and the conversation/state snapshot.
    fn checkpoint_restore(&self, workbench_id: &str, checkpoint_id: &str) -> Result<(), StoreError>;

    /// Restore only the published files, leaving conversation and state alone.
    fn checkpoint_restore_published(
        &self,
        workbench_id: &str,
        checkpoint_id: &str,
    ) -> Result<(), StoreError>;

    fn checkpoints_list(&self, workbench_id: &str) -> Result<Vec<CheckpointInfo>, StoreError>;
}
