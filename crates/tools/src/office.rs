//! Office operations (`xlsx_operations`, `docx_operations`,
//! `pptx_operations`) and the worker call they share with proposal apply.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

use workshop_core::error::ToolError;
use workshop_core::store::FileKind;
use workshop_core::tool::{FocusHint, Tool, ToolWorker};
use workshop_workbench::sandbox::base_name;

use crate::context::ToolContext;
use crate::focus::{docx_focus_hint, has_add_slide, pptx_focus_hint, xlsx_focus_hint};
use crate::parse_args;

/// The office formats the worker can edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeKind {
    Xlsx,
    Docx,
    Pptx,
}

impl OfficeKind {
    pub fn from_file_kind(kind: FileKind) -> Option<Self> {
        match kind {
            FileKind::Xlsx => Some(OfficeKind::Xlsx),
            FileKind::Docx => Some(OfficeKind::Docx),
            FileKind::Pptx => Some(OfficeKind::Pptx),
            _ => None,
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "xlsx" => Some(OfficeKind::Xlsx),
            "docx" => Some(OfficeKind::Docx),
            "pptx" => Some(OfficeKind::Pptx),
            _ => None,
        }
    }

    pub fn file_kind(self) -> FileKind {
        match self {
            OfficeKind::Xlsx => FileKind::Xlsx,
            OfficeKind::Docx => FileKind::Docx,
            OfficeKind::Pptx => FileKind::Pptx,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.file_kind().as_str()
    }

    fn apply_method(self) -> &'static str {
        match self {
            OfficeKind::Xlsx => "XlsxApplyOps",
            OfficeKind::Docx => "DocxApplyOps",
            OfficeKind::Pptx => "PptxApplyOps",
        }
    }

    fn tool_name(self) -> &'static str {
        match self {
            OfficeKind::Xlsx => "xlsx_operations",
            OfficeKind::Docx => "docx_operations",
            OfficeKind::Pptx => "pptx_operations",
        }
    }

    /// Focus hint derivable from the operations alone.
    pub fn focus_hint(self, ops: &[Value]) -> Option<FocusHint> {
        match self {
            OfficeKind::Xlsx => xlsx_focus_hint(ops),
            OfficeKind::Docx => docx_focus_hint(ops),
            OfficeKind::Pptx => pptx_focus_hint(ops),
        }
    }
}

/// Copy legacy field names onto the ones the worker expects, without
/// overriding fields that are already set.
pub fn normalize_aliases(kind: OfficeKind, ops: &mut [Value]) {
    let (canonical, legacy) = match kind {
        OfficeKind::Docx => ("search", "find"),
        OfficeKind::Pptx => ("index", "slide_index"),
        OfficeKind::Xlsx => return,
    };
    for op in ops.iter_mut() {
        let Some(map) = op.as_object_mut() else { continue };
        if map.contains_key(canonical) {
            continue;
        }
        if let Some(value) = map.get(legacy).cloned() {
            map.insert(canonical.to_string(), value);
        }
    }
}

/// One batch of office operations against a single file.
#[derive(Debug, Clone)]
pub struct OfficeOpsRequest<'a> {
    pub kind: OfficeKind,
    pub path: &'a str,
    pub ops: &'a [Value],
    /// Worker root: "draft" or a staging area name.
    pub root: &'a str,
    pub create_new: bool,
    pub copy_from: Option<&'a str>,
}

/// Send a batch of operations to the worker.
pub async fn apply_office_ops(
    worker: &dyn ToolWorker,
    workbench_id: &str,
    request: &OfficeOpsRequest<'_>,
) -> Result<Value, ToolError> {
    let mut params = Map::new();
    params.insert("workbench_id".into(), json!(workbench_id));
    params.insert("path".into(), json!(request.path));
    params.insert("ops".into(), Value::Array(request.ops.to_vec()));
    params.insert("root".into(), json!(request.root));
    if request.create_new {
        params.insert("create_new".into(), json!(true));
    }
    if let Some(copy_from) = request.copy_from.filter(|c| !c.is_empty()) {
        params.insert("copy_from".into(), json!(copy_from));
    }
    debug!(workbench_id, path = request.path, ops = request.ops.len(), method = request.kind.apply_method(), "Applying office ops");
    worker
        .call(request.kind.apply_method(), Value::Object(params))
        .await
}

/// Index of the last slide of a deck in `root`, if the worker can tell.
pub async fn last_slide_index(
    worker: &dyn ToolWorker,
    workbench_id: &str,
    path: &str,
    root: &str,
) -> Option<u32> {
    let response = worker
        .call(
            "PptxGetMap",
            json!({"workbench_id": workbench_id, "path": path, "root": root}),
        )
        .await
        .ok()?;
    let count = response.get("slide_count")?.as_u64()?;
    (count > 0).then(|| (count - 1) as u32)
}

/// Focus hint for a batch that has already been applied in `root`. Decks
/// that only gained slides point at the last slide.
pub async fn resolve_focus_hint(
    worker: &dyn ToolWorker,
    workbench_id: &str,
    request: &OfficeOpsRequest<'_>,
) -> Option<FocusHint> {
    if let Some(hint) = request.kind.focus_hint(request.ops) {
        return Some(hint);
    }
    if request.kind != OfficeKind::Pptx || !has_add_slide(request.ops) {
        return None;
    }
    last_slide_index(worker, workbench_id, request.path, request.root)
        .await
        .map(|slide_index| FocusHint::Slide { slide_index })
}

pub struct OfficeOpsTool {
    kind: OfficeKind,
    ctx: Arc<ToolContext>,
}

impl OfficeOpsTool {
    pub fn new(kind: OfficeKind, ctx: Arc<ToolContext>) -> Self {
        Self { kind, ctx }
    }
}

#[derive(Deserialize)]
struct OfficeOpsArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    create_new: bool,
    #[serde(default)]
    copy_from: String,
    #[serde(default)]
    operations: Vec<Value>,
}

fn operation_item_schema(kind: OfficeKind) -> Value {
    match kind {
        OfficeKind::Xlsx => json!({
            "type": "object",
            "properties": {
                "op": {"type": "string", "enum": ["ensure_sheet", "set_range", "set_cells", "summarize_by_category", "set_column_widths", "set_row_heights", "freeze_panes"], "description": "Operation type"},
                "sheet": {"type": "string", "description": "Target sheet name"},
                "start": {"type": "string", "description": "Starting cell for set_range (e.g. A1)"},
                "values": {"type": "array", "description": "2D array of values for set_range", "items": {"type": "array", "items": {"type": "string"}}},
                "cells": {"type": "array", "description": "Cells for set_cells", "items": {"type": "object", "properties": {"cell": {"type": "string"}, "value": {"type": "string"}}}},
                "style": {"type": "object", "description": "Optional style for style-capable writes", "additionalProperties": true}
            },
            "required": ["op"]
        }),
        OfficeKind::Docx => json!({
            "type": "object",
            "properties": {
                "op": {"type": "string", "enum": ["set_paragraphs", "append_paragraph", "replace_text"], "description": "Operation type"},
                "paragraphs": {"type": "array", "description": "Paragraphs for set_paragraphs", "items": {"type": "object", "properties": {"text": {"type": "string"}, "style": {"type": "string"}}}},
                "text": {"type": "string", "description": "Paragraph text for append_paragraph"},
                "style": {"type": "string", "description": "Paragraph style"},
                "search": {"type": "string", "description": "Text to find for replace_text"},
                "replace": {"type": "string", "description": "Replacement text"},
                "section_index": {"type": "integer", "description": "Target section index (0-based)"}
            },
            "required": ["op"]
        }),
        OfficeKind::Pptx => json!({
            "type": "object",
            "properties": {
                "op": {"type": "string", "enum": ["add_slide", "set_slide_text", "append_bullets"], "description": "Operation type"},
                "layout": {"type": "string", "description": "Slide layout for add_slide"},
                "title": {"type": "string", "description": "Slide title"},
                "body": {"type": "string", "description": "Slide body text"},
                "index": {"type": "integer", "description": "Target slide index (0-based)"},
                "bullets": {"type": "array", "items": {"type": "string"}, "description": "Bullet points for append_bullets"}
            },
            "required": ["op"]
        }),
    }
}

#[async_trait]
impl Tool for OfficeOpsTool {
    fn name(&self) -> &str {
        self.kind.tool_name()
    }

    fn description(&self) -> &str {
        match self.kind {
            OfficeKind::Xlsx => "Create or modify an Excel file. Can copy from existing file or create new. Operations: ensure_sheet, set_range, set_cells, summarize_by_category, set_column_widths, set_row_heights, freeze_panes.",
            OfficeKind::Docx => "Create or modify a Word document. Operations: set_paragraphs, append_paragraph, replace_text.",
            OfficeKind::Pptx => "Create or modify a PowerPoint presentation. Operations: add_slide, set_slide_text, append_bullets.",
        }
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Target filename (no directory prefix)"},
                "create_new": {"type": "boolean", "description": "If true, creates a new file (otherwise modifies existing)"},
                "copy_from": {"type": "string", "description": "Source filename to copy from when creating new (no directory prefix)"},
                "operations": {
                    "type": "array",
                    "description": "List of operations to apply",
                    "items": operation_item_schema(self.kind)
                }
            },
            "required": ["path", "operations"]
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let mut args: OfficeOpsArgs = parse_args(arguments)?;
        if args.path.trim().is_empty() {
            return Err(ToolError::InvalidArguments("path is required".into()));
        }
        let path = base_name(&args.path);
        let copy_from = (!args.copy_from.trim().is_empty()).then(|| base_name(&args.copy_from));
        if args.operations.is_empty() {
            return Err(ToolError::InvalidArguments("operations is required".into()));
        }
        normalize_aliases(self.kind, &mut args.operations);

        let worker = self.ctx.worker()?;
        self.ctx.ensure_draft().await?;

        let request = OfficeOpsRequest {
            kind: self.kind,
            path: &path,
            ops: &args.operations,
            root: "draft",
            create_new: args.create_new,
            copy_from: copy_from.as_deref(),
        };
        apply_office_ops(worker, self.ctx.workbench_id(), &request)
            .await
            .map_err(|e| match e {
                ToolError::WorkerUnavailable(_) | ToolError::SandboxViolation(_) => e,
                other => ToolError::ExecutionFailed {
                    tool_name: self.kind.tool_name().into(),
                    reason: format!("{} operation failed: {other}", self.kind.as_str()),
                },
            })?;

        if let Some(hint) = resolve_focus_hint(worker, self.ctx.workbench_id(), &request).await {
            self.ctx.set_focus_hint(&path, hint);
        }

        let action = if args.create_new { "Created" } else { "Modified" };
        Ok(format!(
            "{action} {path} with {} operations",
            args.operations.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeWorker, workbench_with};
    use workshop_core::store::WorkbenchStore;

    fn tool_with(kind: OfficeKind, worker: FakeWorker) -> (tempfile::TempDir, Arc<FakeWorker>, OfficeOpsTool, Arc<ToolContext>) {
        let (dir, store, wb) = workbench_with(&[]);
        let worker = Arc::new(worker);
        let ctx = Arc::new(ToolContext::new(
            wb,
            Arc::new(store),
            Some(worker.clone() as Arc<dyn ToolWorker>),
        ));
        (dir, worker, OfficeOpsTool::new(kind, ctx.clone()), ctx)
    }

    #[test]
    fn aliases_do_not_override() {
        let mut ops = vec![
            json!({"op": "replace_text", "find": "a"}),
            json!({"op": "replace_text", "find": "a", "search": "b"}),
        ];
        normalize_aliases(OfficeKind::Docx, &mut ops);
        assert_eq!(ops[0]["search"], "a");
        assert_eq!(ops[1]["search"], "b");

        let mut slides = vec![json!({"op": "set_slide_text", "slide_index": 2})];
        normalize_aliases(OfficeKind::Pptx, &mut slides);
        assert_eq!(slides[0]["index"], 2);
    }

    #[tokio::test]
    async fn xlsx_ops_create_draft_and_record_hint() {
        let worker = FakeWorker::new().respond("XlsxApplyOps", json!({"ok": true}));
        let (_dir, worker, tool, ctx) = tool_with(OfficeKind::Xlsx, worker);
        let out = tool
            .execute(json!({
                "path": "draft/q1.xlsx",
                "create_new": true,
                "operations": [
                    {"op": "ensure_sheet", "sheet": "Q1"},
                    {"op": "set_range", "sheet": "Q1", "start": "A1", "values": [["Month", "Revenue"], ["Jan", "100"]]}
                ]
            }))
            .await
            .unwrap();
        assert_eq!(out, "Created q1.xlsx with 2 operations");

        let calls = worker.calls("XlsxApplyOps");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["root"], "draft");
        assert_eq!(calls[0]["path"], "q1.xlsx");
        assert_eq!(calls[0]["create_new"], true);
        assert!(ctx.store().draft_state(ctx.workbench_id()).unwrap().is_some());
        assert!(matches!(
            ctx.focus_hints().get("q1.xlsx"),
            Some(FocusHint::Sheet { row_end: Some(1), col_end: Some(1), .. })
        ));
    }

    #[tokio::test]
    async fn pptx_add_slide_points_at_last_slide() {
        let worker = FakeWorker::new()
            .respond("PptxApplyOps", json!({"ok": true}))
            .respond("PptxGetMap", json!({"slide_count": 4}));
        let (_dir, _worker, tool, ctx) = tool_with(OfficeKind::Pptx, worker);
        tool.execute(json!({
            "path": "deck.pptx",
            "operations": [{"op": "add_slide", "title": "Summary"}]
        }))
        .await
        .unwrap();
        assert_eq!(
            ctx.focus_hints().get("deck.pptx"),
            Some(&FocusHint::Slide { slide_index: 3 })
        );
    }

    #[tokio::test]
    async fn empty_operations_are_rejected() {
        let (_dir, worker, tool, _ctx) = tool_with(OfficeKind::Docx, FakeWorker::new());
        let err = tool
            .execute(json!({"path": "r.docx", "operations": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(worker.calls("DocxApplyOps").is_empty());
    }

    #[tokio::test]
    async fn unavailable_worker_surfaces_distinctly() {
        let (_dir, _worker, tool, _ctx) = tool_with(OfficeKind::Docx, FakeWorker::unavailable());
        let err = tool
            .execute(json!({"path": "r.docx", "operations": [{"op": "append_paragraph", "text": "x"}]}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::WorkerUnavailable(_)));
    }
}
