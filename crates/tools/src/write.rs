//! `write_text_file`: create or overwrite a plain text file in the draft.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use workshop_core::error::ToolError;
use workshop_core::store::{Area, FileKind};
use workshop_core::tool::Tool;
use workshop_workbench::sandbox::base_name;

use crate::context::ToolContext;
use crate::parse_args;

pub struct WriteTextFileTool {
    ctx: Arc<ToolContext>,
}

impl WriteTextFileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct WriteArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Tool for WriteTextFileTool {
    fn name(&self) -> &str {
        "write_text_file"
    }

    fn description(&self) -> &str {
        "Write or create a text file (md, txt, csv, json, etc.). Overwrites if file exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path to write"},
                "content": {"type": "string", "description": "File content"}
            },
            "required": ["path", "content"]
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let args: WriteArgs = parse_args(arguments)?;
        if args.path.trim().is_empty() {
            return Err(ToolError::InvalidArguments("path is required".into()));
        }
        // Models sometimes prefix names with "draft/"; the workbench is flat.
        let path = base_name(&args.path);
        let kind = FileKind::for_path(&path);
        if kind != FileKind::Text {
            return Err(ToolError::InvalidArguments(format!(
                "write_text_file only supports text files, got kind: {}",
                kind.as_str()
            )));
        }

        self.ctx.ensure_draft().await?;
        self.ctx.store().apply_write_to_area(
            self.ctx.workbench_id(),
            &Area::Draft,
            &path,
            &args.content,
        )?;
        debug!(workbench_id = %self.ctx.workbench_id(), path = %path, bytes = args.content.len(), "Text file written");
        Ok(format!(
            "Successfully wrote {} bytes to {}",
            args.content.len(),
            path
        ))
    }
}
