//! Tool traits: how the agent loop reaches the outside world.
//!
//! The loop only sees a [`ToolHandler`]: execute a call, get text back, and
//! ask afterwards where in each file the edits landed. Individual tools
//! implement [`Tool`] and are collected in a [`ToolRegistry`]. Office-format
//! work is delegated further to an external [`ToolWorker`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::message::ToolCall;

/// Where to look in a changed file during review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FocusHint {
    /// Zero-based bounding box of the largest edited region of a sheet.
    /// Bounds are absent when only sheet-level operations touched it.
    Sheet {
        sheet: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row_start: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row_end: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        col_start: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        col_end: Option<u32>,
    },
    Section { section_index: u32 },
    Slide { slide_index: u32 },
}

/// The tool-execution capability consumed by the agent loop.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute one call and return the text handed back to the model.
    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError>;

    /// Per-path focus hints collected from successful edits so far.
    /// When a path is edited repeatedly the last edit wins.
    fn focus_hints(&self) -> HashMap<String, FocusHint>;
}

/// External backend that manipulates office formats and extracts text.
///
/// Methods follow a JSON-RPC shape: a method name plus a params object,
/// returning a result object. An unreachable backend must return
/// [`ToolError::WorkerUnavailable`].
#[async_trait]
pub trait ToolWorker: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ToolError>;
}

/// A single named tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Read-only tools are the only ones offered during research.
    fn read_only(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tools keyed by name, iterated in name order so schemas are stable
/// between requests.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Definitions of the read-only subset.
    pub fn read_only_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|t| t.read_only())
            .map(|t| t.to_definition())
            .collect()
    }

    /// Definitions for the named tools, skipping unknown names.
    pub fn select(&self, names: &[&str]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.tools.get(*name))
            .map(|t| t.to_definition())
            .collect()
    }

    /// Parse the call's raw arguments and run the named tool.
    pub async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))?
        };
        tool.execute(arguments).await
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
