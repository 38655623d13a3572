//! `workshop create`, `workshop list` and `workshop status`.

use std::fmt::Write;

use workshop_agent::PlanItemStatus;
use workshop_core::WorkbenchStore;
use workshop_workbench::{ToolLog, WorkshopState};

use super::Engine;

pub fn create(engine: &Engine, name: &str) -> anyhow::Result<String> {
    let wb = engine
        .store()
        .create_workbench(name, &engine.config().default_model)?;
    Ok(format!("Created workbench {} ({})\n", wb.name, wb.id))
}

pub fn list(engine: &Engine) -> anyhow::Result<String> {
    let workbenches = engine.store().list_workbenches()?;
    if workbenches.is_empty() {
        return Ok("No workbenches yet. Create one with `workshop create <name>`.\n".into());
    }
    let mut out = String::new();
    for wb in workbenches {
        writeln!(out, "{}  {}  (created {})", wb.id, wb.name, wb.created_at)?;
    }
    Ok(out)
}

pub fn status(engine: &Engine, workbench_id: &str) -> anyhow::Result<String> {
    let wb = engine.store().get_workbench(workbench_id)?;
    let layout = engine.store().layout(workbench_id)?;
    let workshop = engine.workshop();
    let mut out = String::new();

    writeln!(out, "Workbench {} ({})", wb.name, wb.id)?;
    writeln!(out, "  Model:       {}", workshop.active_model(workbench_id)?)?;

    match workshop.draft_state(workbench_id)? {
        Some(draft) => writeln!(out, "  Draft:       {} (opened {})", draft.draft_id, draft.created_at)?,
        None => writeln!(out, "  Draft:       none")?,
    }
    if let Some(pending) = WorkshopState::load(&layout)?.pending_proposal_id {
        writeln!(out, "  Proposal:    {pending} pending")?;
    }

    let rpi = workshop.rpi_artifacts(workbench_id)?.state()?;
    let research = if rpi.has_research { "done" } else { "not started" };
    writeln!(out, "  Research:    {research}")?;
    match &rpi.plan {
        Some(plan) => {
            let done = plan.items().filter(|i| i.status == PlanItemStatus::Done).count();
            let failed = plan
                .items()
                .filter(|i| matches!(i.status, PlanItemStatus::Failed(_)))
                .count();
            writeln!(
                out,
                "  Plan:        {done}/{} done, {failed} failed",
                plan.item_count()
            )?;
        }
        None => writeln!(out, "  Plan:        none")?,
    }

    let tool_calls = ToolLog::open(&layout).entries().len();
    writeln!(out, "  Tool log:    {tool_calls} entries")?;
    writeln!(
        out,
        "  Checkpoints: {}",
        engine.store().checkpoints_list(workbench_id)?.len()
    )?;
    Ok(out)
}
