//! `recall_tool_result`: fetch the full output behind a receipt.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use workshop_core::error::ToolError;
use workshop_core::tool::Tool;
use workshop_workbench::ToolLog;

use crate::context::ToolContext;
use crate::parse_args;

pub struct RecallToolResultTool {
    ctx: Arc<ToolContext>,
}

impl RecallToolResultTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct RecallArgs {
    #[serde(default)]
    entry_id: i64,
}

#[async_trait]
impl Tool for RecallToolResultTool {
    fn name(&self) -> &str {
        "recall_tool_result"
    }

    fn description(&self) -> &str {
        "Recall the full result of an earlier tool call by its tool log entry id. Use this when a receipt summary is not enough."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entry_id": {"type": "integer", "description": "Tool log entry id from a receipt"}
            },
            "required": ["entry_id"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let args: RecallArgs = parse_args(arguments)?;
        if args.entry_id <= 0 {
            return Err(ToolError::InvalidArguments("entry_id must be >= 1".into()));
        }
        let layout = self.ctx.store().layout(self.ctx.workbench_id())?;
        let entry = ToolLog::open(&layout)
            .entry(args.entry_id as u64)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "recall_tool_result".into(),
                reason: format!("recall failed: {e}"),
            })?;
        Ok(entry.result)
    }
}
