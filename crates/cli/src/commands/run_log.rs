//! `workshop plan` and `workshop tool-log`.

use std::fmt::Write;

use workshop_core::WorkbenchStore;
use workshop_workbench::{ToolLog, ToolLogEntry};

use super::Engine;

/// Longest result shown per entry in the listing.
const PREVIEW_CHARS: usize = 80;

pub fn plan(engine: &Engine, workbench_id: &str) -> anyhow::Result<String> {
    let artifacts = engine.workshop().rpi_artifacts(workbench_id)?;
    Ok(match artifacts.plan()? {
        Some(plan) => {
            let mut out = String::new();
            for item in plan.items() {
                writeln!(out, "{}", item.render())?;
            }
            out
        }
        None => "No plan yet.\n".into(),
    })
}

pub fn tool_log(engine: &Engine, workbench_id: &str, id: Option<u64>) -> anyhow::Result<String> {
    let log = ToolLog::open(&engine.store().layout(workbench_id)?);
    let mut out = String::new();

    if let Some(id) = id {
        let entry = log.entry(id)?;
        writeln!(out, "#{} {} ({} ms, {})", entry.id, entry.tool, entry.elapsed_ms, entry.ts)?;
        writeln!(out, "args: {}", entry.args)?;
        if let Some(error) = &entry.error {
            writeln!(out, "error: {error}")?;
        }
        writeln!(out, "receipt: {}", entry.receipt)?;
        writeln!(out, "result:\n{}", entry.result)?;
        return Ok(out);
    }

    let entries = log.entries();
    if entries.is_empty() {
        return Ok("Tool log is empty.\n".into());
    }
    for entry in &entries {
        writeln!(out, "{}", summary_line(entry))?;
    }
    Ok(out)
}

fn summary_line(entry: &ToolLogEntry) -> String {
    let status = if entry.error.is_some() { "error" } else { "ok" };
    let flat = entry.result.replace('\n', " ");
    let preview: String = flat.chars().take(PREVIEW_CHARS).collect();
    let ellipsis = if flat.chars().count() > PREVIEW_CHARS { "..." } else { "" };
    format!("#{:<4} {:<22} {:<5} {preview}{ellipsis}", entry.id, entry.tool, status)
}
