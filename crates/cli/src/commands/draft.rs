//! `workshop diff`, `workshop publish`, `workshop discard` and
//! `workshop checkpoints`.

use std::fmt::Write;

use workshop_agent::TextDiff;
use workshop_workbench::LineKind;

use super::Engine;

/// Text diff only: the CLI has no office worker, so structured files fail
/// with `TOOL_WORKER_UNAVAILABLE`.
pub async fn diff(engine: &Engine, workbench_id: &str, path: &str) -> anyhow::Result<String> {
    let diff = engine.workshop().review_text_diff(workbench_id, path).await?;
    render_diff(path, &diff)
}

fn render_diff(path: &str, diff: &TextDiff) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "--- published/{path}")?;
    writeln!(out, "+++ draft/{path}")?;
    if let Some(warning) = &diff.reference_warning {
        writeln!(out, "# {warning}")?;
    }
    if diff.too_large {
        writeln!(out, "# Diff too large to display")?;
        return Ok(out);
    }
    if diff.hunks.is_empty() {
        writeln!(out, "# No differences")?;
    }
    for hunk in &diff.hunks {
        let first_old = hunk.lines.iter().find_map(|l| l.old_line).unwrap_or(0);
        let first_new = hunk.lines.iter().find_map(|l| l.new_line).unwrap_or(0);
        writeln!(out, "@@ -{first_old} +{first_new} @@")?;
        for line in &hunk.lines {
            let marker = match line.kind {
                LineKind::Context => ' ',
                LineKind::Added => '+',
                LineKind::Removed => '-',
            };
            writeln!(out, "{marker}{}", line.text)?;
        }
    }
    Ok(out)
}

pub fn publish(engine: &Engine, workbench_id: &str) -> anyhow::Result<String> {
    let checkpoint_id = engine.workshop().publish_draft(workbench_id)?;
    Ok(format!("Published draft (checkpoint {checkpoint_id})\n"))
}

pub fn discard(engine: &Engine, workbench_id: &str) -> anyhow::Result<String> {
    let workshop = engine.workshop();
    if workshop.draft_state(workbench_id)?.is_none() {
        return Ok("No draft to discard.\n".into());
    }
    workshop.discard_draft(workbench_id)?;
    Ok("Discarded draft.\n".into())
}

pub fn checkpoints(engine: &Engine, workbench_id: &str) -> anyhow::Result<String> {
    let checkpoints = engine.workshop().checkpoints_list(workbench_id)?;
    if checkpoints.is_empty() {
        return Ok("No checkpoints yet.\n".into());
    }
    let mut out = String::new();
    for cp in checkpoints {
        writeln!(
            out,
            "{}  {:<12} {}  {}",
            cp.checkpoint_id, cp.reason, cp.created_at, cp.description
        )?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::engine_with;
    use workshop_core::WorkbenchStore;

    fn open_draft_with(engine: &Engine, wb: &str, name: &str, content: &str) {
        engine.store().create_draft(wb, "workshop", "manual").unwrap();
        let draft_dir = engine.store().layout(wb).unwrap().draft_dir();
        std::fs::write(draft_dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn diff_renders_unified_lines() {
        let (_dir, engine, wb) = engine_with(&[("notes.txt", "a\nb\n")]);
        open_draft_with(&engine, &wb, "notes.txt", "a\nc\n");

        let out = diff(&engine, &wb, "notes.txt").await.unwrap();
        assert!(out.starts_with("--- published/notes.txt\n+++ draft/notes.txt\n@@"));
        assert!(out.contains("-b\n"));
        assert!(out.contains("+c\n"));
        assert!(out.contains(" a\n"));
    }

    #[tokio::test]
    async fn diff_of_office_file_needs_a_worker() {
        let (_dir, engine, wb) = engine_with(&[("q1.xlsx", "PK")]);
        open_draft_with(&engine, &wb, "q1.xlsx", "PK2");
        assert!(diff(&engine, &wb, "q1.xlsx").await.is_err());
    }

    #[test]
    fn publish_then_list_checkpoints() {
        let (_dir, engine, wb) = engine_with(&[("notes.txt", "old")]);
        assert!(publish(&engine, &wb).is_err());
        assert_eq!(checkpoints(&engine, &wb).unwrap(), "No checkpoints yet.\n");

        open_draft_with(&engine, &wb, "notes.txt", "new");
        let out = publish(&engine, &wb).unwrap();
        assert!(out.starts_with("Published draft (checkpoint "));

        let listed = checkpoints(&engine, &wb).unwrap();
        assert_eq!(listed.lines().count(), 1);
        assert!(listed.contains("publish"));
        let published = engine.store().layout(&wb).unwrap().published_dir();
        assert_eq!(std::fs::read_to_string(published.join("notes.txt")).unwrap(), "new");
    }

    #[test]
    fn discard_is_a_no_op_without_a_draft() {
        let (_dir, engine, wb) = engine_with(&[]);
        assert_eq!(discard(&engine, &wb).unwrap(), "No draft to discard.\n");
        open_draft_with(&engine, &wb, "a.txt", "x");
        assert_eq!(discard(&engine, &wb).unwrap(), "Discarded draft.\n");
        assert!(engine.workshop().draft_state(&wb).unwrap().is_none());
    }
}
