//! On-disk phase artifacts under `meta/workshop/_rpi/`.
//!
//! `research.md` holds the research notes. The plan is stored as
//! `plan.json` and mirrored to `plan.md` for readers that want the
//! checklist text. Which phases still need to run is derived from what
//! exists here.

use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

use workshop_core::error::{Error, Result};
use workshop_core::layout::WorkbenchLayout;
use workshop_workbench::fsutil::{atomic_write, read_json_opt, remove_if_exists, write_json_atomic};

use super::plan::Plan;

const RESEARCH_FILE: &str = "research.md";
const PLAN_FILE: &str = "plan.json";
const PLAN_MARKDOWN_FILE: &str = "plan.md";

/// Where a run stands, read from the artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpiState {
    pub has_research: bool,
    pub plan: Option<Plan>,
}

impl RpiState {
    pub fn has_plan(&self) -> bool {
        self.plan.is_some()
    }

    /// True once a plan exists and no item is pending.
    pub fn all_done(&self) -> bool {
        self.plan.as_ref().is_some_and(Plan::all_done)
    }
}

pub struct RpiArtifacts {
    dir: PathBuf,
}

impl RpiArtifacts {
    pub fn new(layout: &WorkbenchLayout) -> Self {
        Self {
            dir: layout.rpi_dir(),
        }
    }

    pub fn state(&self) -> Result<RpiState> {
        Ok(RpiState {
            has_research: self.dir.join(RESEARCH_FILE).is_file(),
            plan: self.plan()?,
        })
    }

    pub fn research(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.dir.join(RESEARCH_FILE)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::FileRead(format!("research notes: {e}"))),
        }
    }

    pub fn write_research(&self, text: &str) -> Result<()> {
        atomic_write(&self.dir.join(RESEARCH_FILE), text.trim().as_bytes())
            .map_err(|e| Error::FileWrite(format!("research notes: {e}")))
    }

    /// The stored plan. A `plan.md` without `plan.json` (written by an older
    /// build) is parsed from its checklist.
    pub fn plan(&self) -> Result<Option<Plan>> {
        let structured = read_json_opt::<Plan>(&self.dir.join(PLAN_FILE))
            .map_err(|e| Error::FileRead(format!("plan: {e}")))?;
        if structured.is_some() {
            return Ok(structured);
        }
        match fs::read_to_string(self.dir.join(PLAN_MARKDOWN_FILE)) {
            Ok(markdown) => {
                let plan = Plan::parse(&markdown);
                if plan.is_none() {
                    warn!(dir = %self.dir.display(), "plan.md holds no checklist items");
                }
                Ok(plan)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::FileRead(format!("plan: {e}"))),
        }
    }

    /// The plan as markdown, as the implement and summary prompts see it.
    pub fn plan_markdown(&self) -> Result<Option<String>> {
        Ok(self.plan()?.map(|plan| plan.render()))
    }

    pub fn write_plan(&self, plan: &Plan) -> Result<()> {
        write_json_atomic(&self.dir.join(PLAN_FILE), plan)
            .and_then(|()| atomic_write(&self.dir.join(PLAN_MARKDOWN_FILE), plan.render().as_bytes()))
            .map_err(|e| Error::FileWrite(format!("plan: {e}")))?;
        debug!(dir = %self.dir.display(), items = plan.item_count(), "Plan saved");
        Ok(())
    }

    /// Forget every phase artifact, so the next run starts from research.
    pub fn clear(&self) -> Result<()> {
        remove_if_exists(&self.dir).map_err(|e| Error::FileWrite(format!("clear phase state: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpi::plan::PlanItemStatus;

    fn artifacts() -> (tempfile::TempDir, RpiArtifacts) {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = RpiArtifacts::new(&WorkbenchLayout::new(dir.path()));
        (dir, artifacts)
    }

    #[test]
    fn empty_state() {
        let (_dir, artifacts) = artifacts();
        let state = artifacts.state().unwrap();
        assert!(!state.has_research);
        assert!(!state.has_plan());
        assert!(!state.all_done());
        assert_eq!(artifacts.research().unwrap(), None);
    }

    #[test]
    fn research_and_plan_round_trip() {
        let (_dir, artifacts) = artifacts();
        artifacts.write_research("  notes  \n").unwrap();
        let mut plan = Plan::parse("- [ ] 1. Create workbook").unwrap();
        artifacts.write_plan(&plan).unwrap();

        let state = artifacts.state().unwrap();
        assert!(state.has_research);
        assert_eq!(state.plan.as_ref(), Some(&plan));
        assert_eq!(artifacts.research().unwrap().as_deref(), Some("notes"));

        plan.mark(0, PlanItemStatus::Done);
        artifacts.write_plan(&plan).unwrap();
        assert!(artifacts.state().unwrap().all_done());
        assert_eq!(
            fs::read_to_string(artifacts.dir.join(PLAN_MARKDOWN_FILE)).unwrap(),
            "<!-- original_count: 1 -->\n- [x] 1. Create workbook\n"
        );
    }

    #[test]
    fn markdown_only_plan_is_read() {
        let (_dir, artifacts) = artifacts();
        fs::create_dir_all(&artifacts.dir).unwrap();
        fs::write(
            artifacts.dir.join(PLAN_MARKDOWN_FILE),
            "<!-- original_count: 2 -->\n- [x] 1. One\n- [ ] 2. Two\n",
        )
        .unwrap();
        let plan = artifacts.plan().unwrap().unwrap();
        assert_eq!(plan.original_count, 2);
        assert_eq!(plan.next_pending().unwrap().1.label, "Two");
    }

    #[test]
    fn clear_removes_everything() {
        let (_dir, artifacts) = artifacts();
        artifacts.write_research("notes").unwrap();
        artifacts.clear().unwrap();
        artifacts.clear().unwrap();
        assert_eq!(artifacts.state().unwrap(), RpiState::default());
    }
}
