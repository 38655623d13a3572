//! On-disk layout of a workbench.
//!
//! Every crate that reads or writes workbench state resolves its paths here
//! so the layout stays compatible with existing workbenches.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Resolves the well-known paths under one workbench root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbenchLayout {
    root: PathBuf,
}

impl WorkbenchLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join("workbench.json")
    }

    pub fn published_dir(&self) -> PathBuf {
        self.root.join("published")
    }

    pub fn draft_dir(&self) -> PathBuf {
        self.root.join("draft")
    }

    /// Staging areas live next to `draft/` so the commit is a same-volume rename.
    pub fn staging_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    pub fn draft_meta(&self) -> PathBuf {
        self.meta_dir().join("draft.json")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.meta_dir().join("checkpoints")
    }

    pub fn conversation(&self) -> PathBuf {
        self.meta_dir().join("conversation.jsonl")
    }

    pub fn workshop_state(&self) -> PathBuf {
        self.meta_dir().join("workshop_state.json")
    }

    pub fn workshop_dir(&self) -> PathBuf {
        self.meta_dir().join("workshop")
    }

    pub fn rpi_dir(&self) -> PathBuf {
        self.workshop_dir().join("_rpi")
    }

    pub fn tool_log(&self) -> PathBuf {
        self.workshop_dir().join("tool_log.jsonl")
    }

    pub fn proposals_dir(&self) -> PathBuf {
        self.workshop_dir().join("proposals")
    }

    pub fn draft_revisions_dir(&self) -> PathBuf {
        self.workshop_dir().join("draft_revisions")
    }

    pub fn draft_revision_dir(&self, message_id: &str) -> PathBuf {
        self.draft_revisions_dir().join(hash_key(message_id))
    }

    pub fn review_root(&self) -> PathBuf {
        self.meta_dir().join("review")
    }

    pub fn review_dir(&self, draft_id: &str) -> PathBuf {
        self.review_root().join(draft_id)
    }

    pub fn baseline_dir(&self, draft_id: &str) -> PathBuf {
        self.review_dir(draft_id).join("baseline")
    }

    pub fn baseline_file(&self, draft_id: &str, path: &str) -> PathBuf {
        self.baseline_dir(draft_id)
            .join(format!("{}.txt", path_key(path)))
    }

    pub fn summary_file(&self, draft_id: &str, path: &str) -> PathBuf {
        self.review_dir(draft_id)
            .join("summaries")
            .join(format!("{}.txt", path_key(path)))
    }

    pub fn focus_hint_file(&self, draft_id: &str, path: &str) -> PathBuf {
        self.review_dir(draft_id)
            .join("focus_hints")
            .join(format!("{}.json", path_key(path)))
    }

    pub fn draft_summary(&self, draft_id: &str) -> PathBuf {
        self.review_dir(draft_id).join("draft_summary.txt")
    }
}

/// Hex SHA-256 of an arbitrary key.
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Case-insensitive key for per-file review artifacts.
pub fn path_key(path: &str) -> String {
    hash_key(&path.trim().to_lowercase())
}
