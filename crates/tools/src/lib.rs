//! Built-in workshop tools.
//!
//! Tools give the agent access to one workbench: listing and reading files,
//! writing text into the draft, editing office files through the tool
//! worker, querying CSV tables, and recalling earlier tool output.
//!
//! Every tool reads from the draft when one is open and from published
//! otherwise. Tools that edit open a draft on first use.

pub mod baseline;
pub mod context;
pub mod files;
pub mod focus;
pub mod handler;
pub mod office;
pub mod recall;
pub mod styles;
pub mod tables;
pub mod write;

#[cfg(test)]
mod testing;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

use workshop_core::error::ToolError;
use workshop_core::tool::ToolRegistry;

pub use baseline::ensure_draft_baseline;
pub use context::ToolContext;
pub use handler::{PLAN_TOOLS, WorkshopToolHandler};
pub use office::{OfficeKind, OfficeOpsRequest, apply_office_ops, resolve_focus_hint};

pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid arguments: {e}")))
}

pub(crate) fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {"path": {"type": "string", "description": description}},
        "required": ["path"]
    })
}

/// Create a registry holding every workshop tool, bound to `ctx`.
pub fn workshop_registry(ctx: Arc<ToolContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(files::ListFilesTool::new(ctx.clone())));
    registry.register(Box::new(files::GetFileInfoTool::new(ctx.clone())));
    registry.register(Box::new(files::GetFileMapTool::new(ctx.clone())));
    registry.register(Box::new(files::ReadFileTool::new(ctx.clone())));
    registry.register(Box::new(write::WriteTextFileTool::new(ctx.clone())));
    for kind in [OfficeKind::Xlsx, OfficeKind::Docx, OfficeKind::Pptx] {
        registry.register(Box::new(office::OfficeOpsTool::new(kind, ctx.clone())));
        registry.register(Box::new(styles::GetStylesTool::new(kind, ctx.clone())));
        registry.register(Box::new(styles::CopyAssetsTool::new(kind, ctx.clone())));
    }
    for op in tables::TableRead::ALL {
        registry.register(Box::new(tables::TableReadTool::new(op, ctx.clone())));
    }
    registry.register(Box::new(tables::TableExportTool::new(ctx.clone())));
    registry.register(Box::new(tables::TableUpdateFromExportTool::new(ctx.clone())));
    registry.register(Box::new(recall::RecallToolResultTool::new(ctx)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::workbench_with;

    #[test]
    fn registry_holds_every_tool() {
        let (_dir, store, wb) = workbench_with(&[]);
        let registry = workshop_registry(Arc::new(ToolContext::new(wb, Arc::new(store), None)));
        let names = registry.names();
        for name in [
            "list_files",
            "get_file_info",
            "get_file_map",
            "read_file",
            "write_text_file",
            "xlsx_operations",
            "docx_get_styles",
            "pptx_copy_assets",
            "table_get_map",
            "table_describe",
            "table_stats",
            "table_read_rows",
            "table_query",
            "table_export",
            "table_update_from_export",
            "recall_tool_result",
        ] {
            assert!(names.contains(&name), "missing {name}");
        }
        assert_eq!(names.len(), 22);
    }

    #[test]
    fn bad_argument_types_are_invalid() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Args {
            path: String,
        }
        let err = parse_args::<Args>(json!({"path": 3})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
