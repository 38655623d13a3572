//! Per-draft review artifacts under `meta/review/<draft_id>/`.

use std::collections::HashMap;
use std::fs;
use std::io;
use tracing::warn;

use workshop_core::error::StoreError;
use workshop_core::layout::WorkbenchLayout;
use workshop_core::tool::FocusHint;

use crate::fsutil::{atomic_write, read_json_opt, write_json_atomic};

/// Review artifacts of one draft.
pub struct ReviewArtifacts {
    layout: WorkbenchLayout,
    draft_id: String,
}

fn read_text_opt(path: &std::path::Path) -> Result<Option<String>, StoreError> {
    match fs::read(path) {
        Ok(data) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl ReviewArtifacts {
    pub fn new(layout: WorkbenchLayout, draft_id: impl Into<String>) -> Self {
        Self {
            layout,
            draft_id: draft_id.into(),
        }
    }

    pub fn draft_id(&self) -> &str {
        &self.draft_id
    }

    pub fn has_baseline(&self, path: &str) -> bool {
        self.layout.baseline_file(&self.draft_id, path).is_file()
    }

    /// Store the pre-edit text of `path`. A baseline is written once and
    /// never replaced; returns whether this call wrote it.
    pub fn write_baseline(&self, path: &str, text: &str) -> Result<bool, StoreError> {
        let file = self.layout.baseline_file(&self.draft_id, path);
        if file.is_file() {
            return Ok(false);
        }
        atomic_write(&file, text.as_bytes())?;
        Ok(true)
    }

    pub fn baseline(&self, path: &str) -> Result<Option<String>, StoreError> {
        read_text_opt(&self.layout.baseline_file(&self.draft_id, path))
    }

    pub fn write_summaries(&self, summaries: &HashMap<String, String>) -> Result<(), StoreError> {
        for (path, summary) in summaries {
            if summary.trim().is_empty() {
                continue;
            }
            atomic_write(
                &self.layout.summary_file(&self.draft_id, path),
                summary.as_bytes(),
            )?;
        }
        Ok(())
    }

    pub fn summary(&self, path: &str) -> Result<Option<String>, StoreError> {
        read_text_opt(&self.layout.summary_file(&self.draft_id, path))
    }

    pub fn write_focus_hints(&self, hints: &HashMap<String, FocusHint>) -> Result<(), StoreError> {
        for (path, hint) in hints {
            write_json_atomic(&self.layout.focus_hint_file(&self.draft_id, path), hint)?;
        }
        Ok(())
    }

    /// Stored hint for `path`. An unreadable hint file is treated as absent.
    pub fn focus_hint(&self, path: &str) -> Option<FocusHint> {
        let file = self.layout.focus_hint_file(&self.draft_id, path);
        match read_json_opt(&file) {
            Ok(hint) => hint,
            Err(e) => {
                warn!(path, error = %e, "Ignoring unreadable focus hint");
                None
            }
        }
    }

    pub fn write_draft_summary(&self, summary: &str) -> Result<(), StoreError> {
        if summary.trim().is_empty() {
            return Ok(());
        }
        atomic_write(&self.layout.draft_summary(&self.draft_id), summary.as_bytes())?;
        Ok(())
    }

    pub fn draft_summary(&self) -> Result<Option<String>, StoreError> {
        read_text_opt(&self.layout.draft_summary(&self.draft_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts() -> (tempfile::TempDir, ReviewArtifacts) {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ReviewArtifacts::new(WorkbenchLayout::new(dir.path()), "d1");
        (dir, artifacts)
    }

    #[test]
    fn baseline_is_written_once() {
        let (_dir, review) = artifacts();
        assert!(review.write_baseline("Report.docx", "original").unwrap());
        assert!(!review.write_baseline("report.docx", "changed").unwrap());
        assert_eq!(review.baseline("REPORT.DOCX").unwrap().as_deref(), Some("original"));
        assert!(review.has_baseline("report.docx"));
        assert!(review.baseline("other.docx").unwrap().is_none());
    }

    #[test]
    fn summaries_skip_blank() {
        let (_dir, review) = artifacts();
        let mut summaries = HashMap::new();
        summaries.insert("a.txt".to_string(), "Added totals".to_string());
        summaries.insert("b.txt".to_string(), "   ".to_string());
        review.write_summaries(&summaries).unwrap();
        assert_eq!(review.summary("A.TXT").unwrap().as_deref(), Some("Added totals"));
        assert!(review.summary("b.txt").unwrap().is_none());
    }

    #[test]
    fn focus_hints_round_trip_per_kind() {
        let (_dir, review) = artifacts();
        let mut hints = HashMap::new();
        hints.insert("deck.pptx".to_string(), FocusHint::Slide { slide_index: 3 });
        review.write_focus_hints(&hints).unwrap();
        assert_eq!(review.focus_hint("deck.pptx"), Some(FocusHint::Slide { slide_index: 3 }));
        assert_eq!(review.focus_hint("missing.pptx"), None);
    }

    #[test]
    fn draft_summary_ignores_empty() {
        let (_dir, review) = artifacts();
        review.write_draft_summary("  ").unwrap();
        assert!(review.draft_summary().unwrap().is_none());
        review.write_draft_summary("Created the Q1 workbook.").unwrap();
        assert_eq!(
            review.draft_summary().unwrap().as_deref(),
            Some("Created the Q1 workbook.")
        );
    }
}
