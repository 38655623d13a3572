//! Applying a stored proposal to the draft.
//!
//! Writes and office operations land in a staging copy of the draft first.
//! The staging area replaces the draft only when at least one change went
//! through, so a reader never sees half a proposal. Hard errors (sandbox,
//! invalid path, missing worker) throw the whole batch away, along with a
//! draft the apply itself opened.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use workshop_core::error::{Error, Result, StoreError, ToolError};
use workshop_core::event::{Notifier, WorkshopEvent};
use workshop_core::layout::{WorkbenchLayout, hash_key};
use workshop_core::store::{Area, DraftState, FileKind, WorkbenchStore};
use workshop_core::tool::{FocusHint, ToolWorker};
use workshop_tools::{OfficeKind, OfficeOpsRequest, apply_office_ops, ensure_draft_baseline, resolve_focus_hint};
use workshop_workbench::fsutil::{read_json_opt, write_json_atomic};
use workshop_workbench::{ReviewArtifacts, WorkshopState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalWrite {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalOp {
    pub path: String,
    /// `xlsx`, `docx` or `pptx`.
    pub kind: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub ops: Vec<Value>,
}

/// A batch of changes waiting to be applied to a workbench's draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: String,
    #[serde(default)]
    pub writes: Vec<ProposalWrite>,
    #[serde(default)]
    pub ops: Vec<ProposalOp>,
    #[serde(default)]
    pub no_changes: bool,
}

impl Proposal {
    fn file(layout: &WorkbenchLayout, proposal_id: &str) -> PathBuf {
        layout.proposals_dir().join(format!("{}.json", hash_key(proposal_id)))
    }

    pub fn load(layout: &WorkbenchLayout, proposal_id: &str) -> Result<Proposal> {
        read_json_opt(&Self::file(layout, proposal_id))
            .map_err(|e| Error::FileRead(format!("proposal {proposal_id}: {e}")))?
            .ok_or_else(|| Error::FileRead(format!("proposal {proposal_id} not found")))
    }

    pub fn save(&self, layout: &WorkbenchLayout) -> Result<()> {
        write_json_atomic(&Self::file(layout, &self.proposal_id), self)
            .map_err(|e| Error::FileWrite(format!("proposal {}: {e}", self.proposal_id)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ApplyOutcome {
    NoChanges { no_changes: bool },
    Applied {
        draft_id: String,
        applied: usize,
        failed: usize,
    },
}

/// What made it into staging.
#[derive(Default)]
struct StagedBatch {
    applied: usize,
    failed: usize,
    summaries: HashMap<String, String>,
    focus_hints: HashMap<String, FocusHint>,
}

pub struct ProposalApplier<'a> {
    pub store: &'a dyn WorkbenchStore,
    pub worker: Option<&'a dyn ToolWorker>,
    pub notifier: &'a dyn Notifier,
    pub workbench_id: &'a str,
    pub max_content_bytes: usize,
}

impl ProposalApplier<'_> {
    pub async fn apply(&self, proposal: &Proposal) -> Result<ApplyOutcome> {
        let layout = self.store.layout(self.workbench_id)?;
        if proposal.no_changes {
            WorkshopState::update(&layout, |s| s.pending_proposal_id = None)?;
            return Ok(ApplyOutcome::NoChanges { no_changes: true });
        }
        self.validate(proposal)?;

        let existing = self.store.draft_state(self.workbench_id)?;
        let draft = self
            .store
            .create_draft(self.workbench_id, "proposal", &proposal.proposal_id)
            .map_err(|e| Error::FileWrite(e.to_string()))?;
        let created = existing.is_none();
        info!(
            workbench_id = self.workbench_id,
            proposal_id = %proposal.proposal_id,
            draft_id = %draft.draft_id,
            created,
            "Applying proposal"
        );

        let batch = match self.stage_and_commit(proposal, &draft, created).await {
            Ok(batch) => batch,
            Err(e) => {
                if created {
                    if let Err(discard) = self.store.discard_draft(self.workbench_id) {
                        warn!(workbench_id = self.workbench_id, error = %discard, "Draft cleanup failed");
                    }
                }
                return Err(e);
            }
        };

        let artifacts = ReviewArtifacts::new(layout.clone(), &draft.draft_id);
        if !batch.summaries.is_empty() {
            artifacts
                .write_summaries(&batch.summaries)
                .map_err(|e| Error::FileWrite(e.to_string()))?;
        }
        if !batch.focus_hints.is_empty() {
            artifacts
                .write_focus_hints(&batch.focus_hints)
                .map_err(|e| Error::FileWrite(e.to_string()))?;
        }
        if let Err(e) = WorkshopState::update(&layout, |s| s.pending_proposal_id = None) {
            warn!(workbench_id = self.workbench_id, error = %e, "Could not clear pending proposal");
        }
        self.notifier.notify(WorkshopEvent::DraftStateChanged {
            workbench_id: self.workbench_id.to_string(),
            has_draft: true,
            draft_id: Some(draft.draft_id.clone()),
        });
        Ok(ApplyOutcome::Applied {
            draft_id: draft.draft_id,
            applied: batch.applied,
            failed: batch.failed,
        })
    }

    /// Reject proposals that target the wrong kinds of files before touching
    /// anything.
    fn validate(&self, proposal: &Proposal) -> Result<()> {
        let index: HashMap<String, _> = self
            .store
            .files_list(self.workbench_id)
            .map_err(|e| Error::FileRead(e.to_string()))?
            .into_iter()
            .map(|f| (f.path.to_lowercase(), f))
            .collect();

        for write in &proposal.writes {
            if FileKind::for_path(&write.path) != FileKind::Text {
                return Err(Error::Validation("unsupported write extension".into()));
            }
            if let Some(file) = index.get(&write.path.to_lowercase()) {
                if file.is_opaque {
                    return Err(Error::Validation("cannot write opaque file".into()));
                }
                if file.file_kind != FileKind::Text {
                    return Err(Error::Validation("cannot write read-only file type".into()));
                }
            }
        }
        for op in &proposal.ops {
            let Some(file) = index.get(&op.path.to_lowercase()) else {
                continue;
            };
            if file.is_opaque {
                return Err(Error::Validation("cannot modify opaque file".into()));
            }
            if !file.file_kind.as_str().eq_ignore_ascii_case(op.kind.trim()) {
                return Err(Error::Validation("op kind does not match existing file".into()));
            }
        }
        Ok(())
    }

    async fn stage_and_commit(
        &self,
        proposal: &Proposal,
        draft: &DraftState,
        created: bool,
    ) -> Result<StagedBatch> {
        if created {
            ensure_draft_baseline(self.store, self.worker, self.workbench_id, &draft.draft_id)
                .await
                .map_err(|e| Error::FileRead(e.to_string()))?;
        }
        let staging = format!("draft.{}.staging", proposal.proposal_id);
        self.store
            .create_draft_staging(self.workbench_id, &staging)
            .map_err(|e| Error::FileWrite(e.to_string()))?;

        let batch = match self.stage(proposal, &staging).await {
            Ok(batch) if batch.applied == 0 && batch.failed > 0 => {
                Err(Error::Validation("no proposal changes applied".into()))
            }
            other => other,
        };
        let committed = batch.and_then(|batch| {
            self.store
                .commit_draft_staging(self.workbench_id, &staging)
                .map_err(|e| Error::FileWrite(e.to_string()))?;
            Ok(batch)
        });
        if committed.is_err() {
            if let Err(e) = self.store.remove_draft_staging(self.workbench_id, &staging) {
                warn!(workbench_id = self.workbench_id, staging, error = %e, "Staging cleanup failed");
            }
        }
        committed
    }

    async fn stage(&self, proposal: &Proposal, staging: &str) -> Result<StagedBatch> {
        let area = Area::Staging(staging.to_string());
        let mut batch = StagedBatch::default();

        for write in &proposal.writes {
            if write.content.len() > self.max_content_bytes {
                debug!(path = %write.path, bytes = write.content.len(), "Proposal write too large");
                batch.failed += 1;
                continue;
            }
            match self
                .store
                .apply_write_to_area(self.workbench_id, &area, &write.path, &write.content)
            {
                Ok(()) => batch.applied += 1,
                Err(e @ StoreError::SandboxViolation(_)) => return Err(e.into()),
                Err(StoreError::InvalidPath(reason)) => return Err(Error::Validation(reason)),
                Err(e) => {
                    debug!(path = %write.path, error = %e, "Proposal write failed");
                    batch.failed += 1;
                }
            }
        }

        for entry in &proposal.ops {
            let Some(kind) = OfficeKind::parse(&entry.kind) else {
                debug!(path = %entry.path, kind = %entry.kind, "Unsupported op kind");
                batch.failed += 1;
                continue;
            };
            let worker = self
                .worker
                .ok_or_else(|| ToolError::WorkerUnavailable("tool worker not configured".into()))?;
            let request = OfficeOpsRequest {
                kind,
                path: &entry.path,
                ops: &entry.ops,
                root: staging,
                create_new: false,
                copy_from: None,
            };
            match apply_office_ops(worker, self.workbench_id, &request).await {
                Ok(_) => {}
                Err(e @ (ToolError::WorkerUnavailable(_) | ToolError::SandboxViolation(_))) => {
                    return Err(e.into());
                }
                Err(e) => {
                    debug!(path = %entry.path, error = %e, "Proposal ops failed");
                    batch.failed += 1;
                    continue;
                }
            }
            batch.applied += 1;
            if !entry.summary.trim().is_empty() {
                batch.summaries.insert(entry.path.clone(), entry.summary.clone());
            }
            if let Some(hint) = resolve_focus_hint(worker, self.workbench_id, &request).await {
                batch.focus_hints.insert(entry.path.clone(), hint);
            }
        }
        debug!(
            workbench_id = self.workbench_id,
            applied = batch.applied,
            failed = batch.failed,
            "Proposal staged"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    use workshop_core::error::ErrorCode;

    use crate::testing::{FakeWorker, RecordingNotifier, TestBench};

    fn write(path: &str, content: &str) -> ProposalWrite {
        ProposalWrite {
            path: path.into(),
            content: content.into(),
        }
    }

    fn proposal(writes: Vec<ProposalWrite>, ops: Vec<ProposalOp>) -> Proposal {
        Proposal {
            proposal_id: "p1".into(),
            writes,
            ops,
            no_changes: false,
        }
    }

    fn applier<'a>(
        bench: &'a TestBench,
        worker: Option<&'a dyn ToolWorker>,
        notifier: &'a RecordingNotifier,
    ) -> ProposalApplier<'a> {
        ProposalApplier {
            store: bench.store.as_ref(),
            worker,
            notifier,
            workbench_id: &bench.workbench_id,
            max_content_bytes: 16,
        }
    }

    fn staging_dirs(bench: &TestBench) -> Vec<String> {
        fs::read_dir(bench.layout().root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".staging"))
            .collect()
    }

    #[test]
    fn proposal_round_trips_on_disk() {
        let bench = TestBench::new(&[]);
        let p = proposal(vec![write("a.txt", "x")], vec![]);
        p.save(&bench.layout()).unwrap();
        assert_eq!(Proposal::load(&bench.layout(), "p1").unwrap(), p);
        let err = Proposal::load(&bench.layout(), "missing").unwrap_err();
        assert!(matches!(err, Error::FileRead(_)));
    }

    #[tokio::test]
    async fn partial_success_commits_only_succeeded_writes() {
        let bench = TestBench::new(&[("keep.txt", "old")]);
        let notifier = RecordingNotifier::default();
        let p = proposal(
            vec![write("keep.txt", "new"), write("big.txt", "this content is far too long")],
            vec![],
        );

        let outcome = applier(&bench, None, &notifier).apply(&p).await.unwrap();
        let ApplyOutcome::Applied { applied, failed, .. } = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!((applied, failed), (1, 1));
        let draft = bench.layout().draft_dir();
        assert_eq!(fs::read_to_string(draft.join("keep.txt")).unwrap(), "new");
        assert!(!draft.join("big.txt").exists());
        assert!(staging_dirs(&bench).is_empty());
        assert_eq!(notifier.names(), ["DraftStateChanged"]);
    }

    #[tokio::test]
    async fn zero_success_leaves_no_draft() {
        let bench = TestBench::new(&[("a.txt", "old")]);
        let notifier = RecordingNotifier::default();
        let p = proposal(vec![write("a.txt", "this content is far too long")], vec![]);

        let err = applier(&bench, None, &notifier).apply(&p).await.unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: no proposal changes applied");
        assert!(bench.store.draft_state(&bench.workbench_id).unwrap().is_none());
        assert!(staging_dirs(&bench).is_empty());
        assert!(notifier.events().is_empty());
    }

    #[tokio::test]
    async fn zero_success_keeps_an_existing_draft() {
        let bench = TestBench::new(&[("a.txt", "old")]);
        let draft = bench
            .store
            .create_draft(&bench.workbench_id, "workshop", "agent")
            .unwrap();
        fs::write(bench.layout().draft_dir().join("a.txt"), "edited").unwrap();
        let notifier = RecordingNotifier::default();
        let p = proposal(vec![write("a.txt", "this content is far too long")], vec![]);

        applier(&bench, None, &notifier).apply(&p).await.unwrap_err();
        let state = bench.store.draft_state(&bench.workbench_id).unwrap().unwrap();
        assert_eq!(state.draft_id, draft.draft_id);
        assert_eq!(
            fs::read_to_string(bench.layout().draft_dir().join("a.txt")).unwrap(),
            "edited"
        );
    }

    #[tokio::test]
    async fn sandbox_violation_discards_everything() {
        let bench = TestBench::new(&[]);
        let notifier = RecordingNotifier::default();
        let p = proposal(vec![write("ok.txt", "fine"), write("../escape.txt", "x")], vec![]);

        let err = applier(&bench, None, &notifier).apply(&p).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SandboxViolation);
        assert!(bench.store.draft_state(&bench.workbench_id).unwrap().is_none());
        assert!(staging_dirs(&bench).is_empty());
    }

    #[tokio::test]
    async fn validation_rejects_wrong_targets() {
        let bench = TestBench::new(&[("logo.png", "x"), ("q1.xlsx", "PK")]);
        let notifier = RecordingNotifier::default();
        let applier = applier(&bench, None, &notifier);

        let cases = [
            (proposal(vec![write("q1.xlsx", "x")], vec![]), "unsupported write extension"),
            (
                proposal(vec![], vec![ProposalOp { path: "logo.png".into(), kind: "xlsx".into(), summary: String::new(), ops: vec![] }]),
                "cannot modify opaque file",
            ),
            (
                proposal(vec![], vec![ProposalOp { path: "q1.xlsx".into(), kind: "docx".into(), summary: String::new(), ops: vec![] }]),
                "op kind does not match existing file",
            ),
        ];
        for (p, message) in cases {
            let err = applier.apply(&p).await.unwrap_err();
            assert_eq!(err.to_string(), format!("Validation failed: {message}"));
        }
        assert!(bench.store.draft_state(&bench.workbench_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn office_ops_record_summary_and_focus_hint() {
        let bench = TestBench::new(&[("q1.xlsx", "PK")]);
        let notifier = RecordingNotifier::default();
        let worker = FakeWorker::new()
            .respond("XlsxExtractText", json!({"text": "before"}))
            .respond("XlsxApplyOps", json!({"ok": true}));
        let p = proposal(
            vec![],
            vec![ProposalOp {
                path: "q1.xlsx".into(),
                kind: "xlsx".into(),
                summary: "Added totals".into(),
                ops: vec![json!({"op": "set_range", "sheet": "Q1", "start": "A1", "values": [[1, 2]]})],
            }],
        );

        let outcome = applier(&bench, Some(&worker as &dyn ToolWorker), &notifier)
            .apply(&p)
            .await
            .unwrap();
        let ApplyOutcome::Applied { draft_id, .. } = outcome else {
            panic!("expected applied outcome");
        };
        let calls = worker.calls("XlsxApplyOps");
        assert_eq!(calls[0]["root"], "draft.p1.staging");
        let artifacts = ReviewArtifacts::new(bench.layout(), &draft_id);
        assert_eq!(artifacts.summary("q1.xlsx").unwrap().as_deref(), Some("Added totals"));
        assert!(artifacts.focus_hint("q1.xlsx").is_some());
        assert_eq!(artifacts.baseline("q1.xlsx").unwrap().as_deref(), Some("before"));
    }

    #[tokio::test]
    async fn missing_worker_fails_office_ops() {
        let bench = TestBench::new(&[]);
        let notifier = RecordingNotifier::default();
        let p = proposal(
            vec![write("a.txt", "x")],
            vec![ProposalOp { path: "new.docx".into(), kind: "docx".into(), summary: String::new(), ops: vec![] }],
        );
        let err = applier(&bench, None, &notifier).apply(&p).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ToolWorkerUnavailable);
        assert!(bench.store.draft_state(&bench.workbench_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn no_changes_clears_pending_proposal() {
        let bench = TestBench::new(&[]);
        let notifier = RecordingNotifier::default();
        WorkshopState::update(&bench.layout(), |s| s.pending_proposal_id = Some("p1".into())).unwrap();
        let mut p = proposal(vec![], vec![]);
        p.no_changes = true;

        let outcome = applier(&bench, None, &notifier).apply(&p).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::NoChanges { no_changes: true });
        assert_eq!(WorkshopState::load(&bench.layout()).unwrap().pending_proposal_id, None);
        assert!(bench.store.draft_state(&bench.workbench_id).unwrap().is_none());
    }
}
