//! Draft review: what changed, and how each file differs from its reference.
//!
//! Text files are diffed published against draft. Structured files are
//! diffed on extracted text, preferring the baseline captured when the draft
//! opened. Without a baseline the current published file stands in, and the
//! response says so.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use workshop_core::error::{Error, Result, StoreError, ToolError};
use workshop_core::store::{Area, DraftState, FileKind, WorkbenchStore};
use workshop_core::tool::{FocusHint, ToolWorker};
use workshop_tools::baseline::extract_text;
use workshop_workbench::{Hunk, ReviewArtifacts, text_diff_with_limit};

pub const PUBLISHED_FALLBACK_WARNING: &str =
    "Draft-start reference unavailable; comparing against current Published.";
pub const REFERENCE_UNAVAILABLE_WARNING: &str = "Reference content unavailable for this file.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    DraftStartSnapshot,
    PublishedCurrentFallback,
    None,
}

/// A review diff. The reference fields are only set for structured files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextDiff {
    pub hunks: Vec<Hunk>,
    pub too_large: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_missing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_source: Option<ReferenceSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_warning: Option<String>,
}

impl TextDiff {
    fn plain((hunks, too_large): (Vec<Hunk>, bool)) -> Self {
        Self {
            hunks,
            too_large,
            baseline_missing: None,
            reference_source: None,
            reference_warning: None,
        }
    }

    fn against(
        (hunks, too_large): (Vec<Hunk>, bool),
        source: ReferenceSource,
        warning: Option<&str>,
    ) -> Self {
        Self {
            hunks,
            too_large,
            baseline_missing: Some(false),
            reference_source: Some(source),
            reference_warning: warning.map(str::to_string),
        }
    }

    fn reference_unavailable() -> Self {
        Self {
            hunks: Vec::new(),
            too_large: false,
            baseline_missing: Some(true),
            reference_source: Some(ReferenceSource::None),
            reference_warning: Some(REFERENCE_UNAVAILABLE_WARNING.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub path: String,
    pub change_type: ChangeType,
    pub file_kind: FileKind,
    pub is_opaque: bool,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_hint: Option<FocusHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSet {
    pub draft_id: String,
    pub changes: Vec<Change>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_summary: Option<String>,
}

/// Review queries over one workbench's open draft.
pub struct Review<'a> {
    store: &'a dyn WorkbenchStore,
    worker: Option<&'a dyn ToolWorker>,
    workbench_id: &'a str,
    max_diff_lines: usize,
}

impl<'a> Review<'a> {
    pub fn new(
        store: &'a dyn WorkbenchStore,
        worker: Option<&'a dyn ToolWorker>,
        workbench_id: &'a str,
        max_diff_lines: usize,
    ) -> Self {
        Self {
            store,
            worker,
            workbench_id,
            max_diff_lines,
        }
    }

    fn draft(&self) -> Result<DraftState> {
        self.store
            .draft_state(self.workbench_id)?
            .ok_or_else(|| Error::Validation("draft not found".into()))
    }

    fn artifacts(&self, draft: &DraftState) -> Result<ReviewArtifacts> {
        Ok(ReviewArtifacts::new(
            self.store.layout(self.workbench_id)?,
            draft.draft_id.clone(),
        ))
    }

    pub async fn text_diff(&self, path: &str) -> Result<TextDiff> {
        let draft = self.draft()?;
        let entry = self
            .store
            .files_list(self.workbench_id)?
            .into_iter()
            .find(|f| f.path.eq_ignore_ascii_case(path));
        let (kind, opaque) = match &entry {
            Some(entry) => (entry.file_kind, entry.is_opaque),
            None => {
                let kind = FileKind::for_path(path);
                (kind, kind.is_opaque())
            }
        };
        if opaque || matches!(kind, FileKind::Binary | FileKind::Image) {
            return Err(Error::Validation("no diff available for this file type".into()));
        }

        if kind == FileKind::Text {
            let before = match self.store.read_file(self.workbench_id, &Area::Published, path) {
                Ok(text) => text,
                Err(StoreError::NotFound(_)) => String::new(),
                Err(e) => return Err(e.into()),
            };
            let after = self.store.read_file(self.workbench_id, &Area::Draft, path)?;
            return Ok(TextDiff::plain(self.diff(&before, &after)));
        }

        let worker = self
            .worker
            .ok_or_else(|| ToolError::WorkerUnavailable("tool worker not configured".into()))?;
        let after = extract_text(worker, self.workbench_id, "draft", path).await?;
        if let Some(before) = self.artifacts(&draft)?.baseline(path)? {
            return Ok(TextDiff::against(
                self.diff(&before, &after),
                ReferenceSource::DraftStartSnapshot,
                None,
            ));
        }

        let published = self.store.area_dir(self.workbench_id, &Area::Published)?;
        if !published.join(path).is_file() {
            debug!(workbench_id = self.workbench_id, path, "No reference for structured diff");
            return Ok(TextDiff::reference_unavailable());
        }
        match extract_text(worker, self.workbench_id, "published", path).await {
            Ok(before) => {
                warn!(workbench_id = self.workbench_id, path, "Baseline missing; diffing against published");
                Ok(TextDiff::against(
                    self.diff(&before, &after),
                    ReferenceSource::PublishedCurrentFallback,
                    Some(PUBLISHED_FALLBACK_WARNING),
                ))
            }
            Err(e @ (ToolError::WorkerUnavailable(_) | ToolError::SandboxViolation(_))) => {
                Err(e.into())
            }
            Err(e) => {
                warn!(workbench_id = self.workbench_id, path, error = %e, "Published extraction failed");
                Ok(TextDiff::reference_unavailable())
            }
        }
    }

    fn diff(&self, before: &str, after: &str) -> (Vec<Hunk>, bool) {
        text_diff_with_limit(before, after, self.max_diff_lines)
    }

    pub fn focus_hint(&self, path: &str) -> Result<Option<FocusHint>> {
        let draft = self.draft()?;
        Ok(self.artifacts(&draft)?.focus_hint(path))
    }

    pub fn summary(&self, path: &str) -> Result<Option<String>> {
        let draft = self.draft()?;
        Ok(self.artifacts(&draft)?.summary(path)?)
    }

    /// Files the draft adds or modifies relative to published, by name.
    pub fn change_set(&self) -> Result<ChangeSet> {
        let draft = self.draft()?;
        let artifacts = self.artifacts(&draft)?;
        let published = self.store.area_dir(self.workbench_id, &Area::Published)?;
        let draft_dir = self.store.area_dir(self.workbench_id, &Area::Draft)?;
        let before = read_area(&published)?;
        let after = read_area(&draft_dir)?;

        if let Some(deleted) = before.keys().find(|name| !after.contains_key(*name)) {
            debug!(workbench_id = self.workbench_id, path = %deleted, "Draft deletes a published file");
            return Err(Error::Validation("deletions are not allowed in draft".into()));
        }

        let mut changes = Vec::new();
        for (name, content) in &after {
            let change_type = match before.get(name) {
                None => ChangeType::Added,
                Some(old) if old != content => ChangeType::Modified,
                Some(_) => continue,
            };
            let kind = FileKind::for_path(name);
            changes.push(Change {
                path: name.clone(),
                change_type,
                file_kind: kind,
                is_opaque: kind.is_opaque(),
                size_bytes: content.len() as u64,
                summary: artifacts.summary(name)?,
                focus_hint: artifacts.focus_hint(name),
            });
        }
        debug!(workbench_id = self.workbench_id, count = changes.len(), "Change set built");
        Ok(ChangeSet {
            draft_summary: artifacts.draft_summary()?.filter(|s| !s.trim().is_empty()),
            draft_id: draft.draft_id,
            changes,
        })
    }
}

/// Listed files of an area with their bytes, by name.
fn read_area(dir: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(Error::FileRead(format!("{}: {e}", dir.display()))),
    };
    for entry in entries {
        let entry = entry.map_err(|e| Error::FileRead(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if !path.is_file() || name.starts_with('.') || name.ends_with(".tmp") {
            continue;
        }
        let content = fs::read(&path).map_err(|e| Error::FileRead(format!("{name}: {e}")))?;
        files.insert(name, content);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    use crate::testing::{FakeWorker, TestBench};

    fn open_draft(bench: &TestBench) -> DraftState {
        bench
            .store
            .create_draft(&bench.workbench_id, "workshop", "agent")
            .unwrap()
    }

    fn write_draft(bench: &TestBench, path: &str, content: &str) {
        let dir = bench.layout().draft_dir();
        fs::write(dir.join(path), content).unwrap();
    }

    #[tokio::test]
    async fn requires_a_draft() {
        let bench = TestBench::new(&[("a.txt", "x")]);
        let review = Review::new(bench.store.as_ref(), None, &bench.workbench_id, 5000);
        let err = review.text_diff("a.txt").await.unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: draft not found");
    }

    #[tokio::test]
    async fn text_diff_against_published() {
        let bench = TestBench::new(&[("a.txt", "one\ntwo\n")]);
        open_draft(&bench);
        write_draft(&bench, "a.txt", "one\nthree\n");
        write_draft(&bench, "new.md", "fresh\n");
        let review = Review::new(bench.store.as_ref(), None, &bench.workbench_id, 5000);

        let diff = review.text_diff("a.txt").await.unwrap();
        assert!(!diff.too_large);
        assert!(diff.reference_source.is_none());
        let json = serde_json::to_value(&diff).unwrap();
        assert!(json.get("baseline_missing").is_none());

        let added = review.text_diff("new.md").await.unwrap();
        assert_eq!(added.hunks[0].lines.len(), 1);
    }

    #[tokio::test]
    async fn opaque_files_have_no_diff() {
        let bench = TestBench::new(&[("logo.png", "x")]);
        open_draft(&bench);
        let review = Review::new(bench.store.as_ref(), None, &bench.workbench_id, 5000);
        let err = review.text_diff("logo.png").await.unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: no diff available for this file type");
    }

    #[tokio::test]
    async fn structured_diff_prefers_baseline() {
        let bench = TestBench::new(&[("q1.xlsx", "PK")]);
        let draft = open_draft(&bench);
        ReviewArtifacts::new(bench.layout(), &draft.draft_id)
            .write_baseline("q1.xlsx", "Revenue 10")
            .unwrap();
        let worker = FakeWorker::new().respond("XlsxExtractText", json!({"text": "Revenue 12"}));
        let review = Review::new(bench.store.as_ref(), Some(&worker as &dyn ToolWorker), &bench.workbench_id, 5000);

        let diff = review.text_diff("q1.xlsx").await.unwrap();
        assert_eq!(diff.baseline_missing, Some(false));
        assert_eq!(diff.reference_source, Some(ReferenceSource::DraftStartSnapshot));
        assert!(diff.reference_warning.is_none());
        assert_eq!(worker.calls("XlsxExtractText").len(), 1);
    }

    #[tokio::test]
    async fn structured_diff_falls_back_to_published() {
        let bench = TestBench::new(&[("brief.docx", "PK")]);
        open_draft(&bench);
        let worker = FakeWorker::new().respond("DocxExtractText", json!({"text": "body"}));
        let review = Review::new(bench.store.as_ref(), Some(&worker as &dyn ToolWorker), &bench.workbench_id, 5000);

        let diff = review.text_diff("brief.docx").await.unwrap();
        assert_eq!(diff.baseline_missing, Some(false));
        assert_eq!(diff.reference_source, Some(ReferenceSource::PublishedCurrentFallback));
        assert_eq!(diff.reference_warning.as_deref(), Some(PUBLISHED_FALLBACK_WARNING));
        let roots: Vec<_> = worker
            .calls("DocxExtractText")
            .iter()
            .map(|p| p["root"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(roots, ["draft", "published"]);
    }

    #[tokio::test]
    async fn new_structured_file_has_no_reference() {
        let bench = TestBench::new(&[]);
        open_draft(&bench);
        write_draft(&bench, "deck.pptx", "PK");
        let worker = FakeWorker::new().respond("PptxExtractText", json!({"text": "slide"}));
        let review = Review::new(bench.store.as_ref(), Some(&worker as &dyn ToolWorker), &bench.workbench_id, 5000);

        let diff = review.text_diff("deck.pptx").await.unwrap();
        assert!(diff.hunks.is_empty());
        assert_eq!(diff.baseline_missing, Some(true));
        assert_eq!(diff.reference_source, Some(ReferenceSource::None));
        assert_eq!(diff.reference_warning.as_deref(), Some(REFERENCE_UNAVAILABLE_WARNING));
    }

    #[tokio::test]
    async fn structured_diff_needs_a_worker() {
        let bench = TestBench::new(&[("q1.xlsx", "PK")]);
        open_draft(&bench);
        let review = Review::new(bench.store.as_ref(), None, &bench.workbench_id, 5000);
        let err = review.text_diff("q1.xlsx").await.unwrap_err();
        assert!(matches!(err, Error::Tool(ToolError::WorkerUnavailable(_))));
    }

    #[test]
    fn change_set_lists_added_and_modified() {
        let bench = TestBench::new(&[("a.txt", "same"), ("b.txt", "old")]);
        let draft = open_draft(&bench);
        write_draft(&bench, "b.txt", "new");
        write_draft(&bench, "c.md", "added");
        let artifacts = ReviewArtifacts::new(bench.layout(), &draft.draft_id);
        artifacts
            .write_summaries(&HashMap::from([("b.txt".to_string(), "Updated b".to_string())]))
            .unwrap();
        artifacts.write_draft_summary("Two files changed.").unwrap();

        let review = Review::new(bench.store.as_ref(), None, &bench.workbench_id, 5000);
        let set = review.change_set().unwrap();
        assert_eq!(set.draft_id, draft.draft_id);
        let summary: Vec<_> = set.changes.iter().map(|c| (c.path.as_str(), c.change_type)).collect();
        assert_eq!(summary, [("b.txt", ChangeType::Modified), ("c.md", ChangeType::Added)]);
        assert_eq!(set.changes[0].summary.as_deref(), Some("Updated b"));
        assert_eq!(set.draft_summary.as_deref(), Some("Two files changed."));

        fs::remove_file(bench.layout().draft_dir().join("a.txt")).unwrap();
        let err = review.change_set().unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: deletions are not allowed in draft");
    }
}
