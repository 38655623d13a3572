//! The Research → Plan → Implement → Summary workflow.
//!
//! Each phase leaves an artifact behind (research notes, the plan and its
//! item states), so a run that fails or is canceled resumes where it stopped
//! when the same message is run again. Summary always runs.

pub mod orchestrator;
pub mod plan;
pub mod prompts;
pub mod state;

use thiserror::Error;

use workshop_core::error::{Error, ErrorInfo, ErrorPhase, ErrorSubphase};

pub use orchestrator::{RpiOrchestrator, RpiOutcome};
pub use plan::{Plan, PlanItem, PlanItemStatus, PlanLine};
pub use state::{RpiArtifacts, RpiState};

/// A failed run, tagged with the phase it failed in when there was one.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunError {
    #[source]
    pub error: Error,
    pub subphase: Option<ErrorSubphase>,
}

impl RunError {
    pub fn in_phase(subphase: ErrorSubphase) -> impl FnOnce(Error) -> RunError {
        move |error| RunError {
            error,
            subphase: Some(subphase),
        }
    }

    pub fn info(&self) -> ErrorInfo {
        let info = self.error.info(ErrorPhase::Workshop);
        match self.subphase {
            Some(subphase) => info.with_subphase(subphase),
            None => info,
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.error.is_canceled()
    }
}

impl From<Error> for RunError {
    fn from(error: Error) -> Self {
        Self {
            error,
            subphase: None,
        }
    }
}
