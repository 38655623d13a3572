//! The [`ToolHandler`] the agent loop talks to.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use workshop_core::error::ToolError;
use workshop_core::llm::ToolDefinition;
use workshop_core::message::ToolCall;
use workshop_core::store::WorkbenchStore;
use workshop_core::tool::{FocusHint, ToolHandler, ToolRegistry, ToolWorker};

use crate::context::ToolContext;
use crate::workshop_registry;

/// Tools the plan phase may call.
pub const PLAN_TOOLS: &[&str] = &["read_file", "recall_tool_result"];

/// Routes tool calls for one workbench run to the built-in tools.
pub struct WorkshopToolHandler {
    registry: ToolRegistry,
    ctx: Arc<ToolContext>,
}

impl WorkshopToolHandler {
    pub fn new(
        workbench_id: impl Into<String>,
        store: Arc<dyn WorkbenchStore>,
        worker: Option<Arc<dyn ToolWorker>>,
    ) -> Self {
        let ctx = Arc::new(ToolContext::new(workbench_id, store, worker));
        Self {
            registry: workshop_registry(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Read-only tools, offered while researching.
    pub fn research_tools(&self) -> Vec<ToolDefinition> {
        self.registry.read_only_definitions()
    }

    pub fn plan_tools(&self) -> Vec<ToolDefinition> {
        self.registry.select(PLAN_TOOLS)
    }

    pub fn all_tools(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}

#[async_trait]
impl ToolHandler for WorkshopToolHandler {
    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        debug!(workbench_id = %self.ctx.workbench_id(), tool = %call.name, call_id = %call.id, "Dispatching tool call");
        self.registry.execute(call).await
    }

    fn focus_hints(&self) -> HashMap<String, FocusHint> {
        self.ctx.focus_hints()
    }
}
