//! Style inspection and asset copying for office files.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use workshop_core::error::ToolError;
use workshop_core::store::FileKind;
use workshop_core::tool::Tool;

use crate::context::ToolContext;
use crate::office::OfficeKind;
use crate::parse_args;

fn invalid(detail: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments(detail.into())
}

fn validate_office_path<'a>(path: &'a str, kind: OfficeKind, field: &str) -> Result<&'a str, ToolError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(invalid(format!("{field} is required")));
    }
    if FileKind::for_path(path) != kind.file_kind() {
        return Err(invalid(format!("{field} must be {}", kind.as_str())));
    }
    Ok(path)
}

/// Each selector is a non-blank name or an object naming a type, id or name.
pub fn validate_asset_selectors(assets: &[Value]) -> Result<(), ToolError> {
    if assets.is_empty() {
        return Err(invalid("assets is required"));
    }
    for (i, asset) in assets.iter().enumerate() {
        match asset {
            Value::String(s) if s.trim().is_empty() => {
                return Err(invalid(format!("assets[{i}] must be non-empty")));
            }
            Value::String(_) => {}
            Value::Object(map) => {
                let named = ["type", "id", "name"].iter().any(|key| {
                    map.get(*key)
                        .and_then(Value::as_str)
                        .is_some_and(|s| !s.trim().is_empty())
                });
                if !named {
                    return Err(invalid(format!(
                        "assets[{i}] must include type, id, or name"
                    )));
                }
            }
            _ => return Err(invalid(format!("assets[{i}] must be string or object"))),
        }
    }
    Ok(())
}

/// `<kind>_get_styles`
pub struct GetStylesTool {
    kind: OfficeKind,
    ctx: Arc<ToolContext>,
}

impl GetStylesTool {
    pub fn new(kind: OfficeKind, ctx: Arc<ToolContext>) -> Self {
        Self { kind, ctx }
    }
}

#[derive(Deserialize)]
struct StylesArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    sheet: String,
}

#[async_trait]
impl Tool for GetStylesTool {
    fn name(&self) -> &str {
        match self.kind {
            OfficeKind::Xlsx => "xlsx_get_styles",
            OfficeKind::Docx => "docx_get_styles",
            OfficeKind::Pptx => "pptx_get_styles",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            OfficeKind::Xlsx => "Inspect cell styles, number formats, column widths and conditional formats in a workbook. Optionally scope to one sheet.",
            OfficeKind::Docx => "Inspect paragraph, character and table styles defined in a Word document.",
            OfficeKind::Pptx => "Inspect slide layouts, masters and theme styles in a presentation.",
        }
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = json!({
            "path": {"type": "string", "description": format!("{} file path in the workbench", self.kind.as_str())}
        });
        if self.kind == OfficeKind::Xlsx {
            properties["sheet"] = json!({"type": "string", "description": "Optional sheet name"});
        }
        json!({"type": "object", "properties": properties, "required": ["path"]})
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let args: StylesArgs = parse_args(arguments)?;
        let path = validate_office_path(&args.path, self.kind, "path")?;
        let mut params = Map::new();
        params.insert("workbench_id".into(), json!(self.ctx.workbench_id()));
        params.insert("path".into(), json!(path));
        params.insert("root".into(), json!(self.ctx.read_root()?));
        let sheet = args.sheet.trim();
        if self.kind == OfficeKind::Xlsx && !sheet.is_empty() {
            params.insert("sheet".into(), json!(sheet));
        }
        let method = match self.kind {
            OfficeKind::Xlsx => "XlsxGetStyles",
            OfficeKind::Docx => "DocxGetStyles",
            OfficeKind::Pptx => "PptxGetStyles",
        };
        self.ctx.call_json_worker(method, Value::Object(params)).await
    }
}

/// `<kind>_copy_assets`: copy styles, layouts or similar assets between two
/// draft files of the same kind.
pub struct CopyAssetsTool {
    kind: OfficeKind,
    ctx: Arc<ToolContext>,
}

impl CopyAssetsTool {
    pub fn new(kind: OfficeKind, ctx: Arc<ToolContext>) -> Self {
        Self { kind, ctx }
    }
}

#[derive(Deserialize)]
struct CopyArgs {
    #[serde(default)]
    source_path: String,
    #[serde(default)]
    target_path: String,
    #[serde(default)]
    assets: Vec<Value>,
}

#[async_trait]
impl Tool for CopyAssetsTool {
    fn name(&self) -> &str {
        match self.kind {
            OfficeKind::Xlsx => "xlsx_copy_assets",
            OfficeKind::Docx => "docx_copy_assets",
            OfficeKind::Pptx => "pptx_copy_assets",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            OfficeKind::Xlsx => "Copy named styles, number formats or sheet formatting from one workbook to another in Draft.",
            OfficeKind::Docx => "Copy paragraph, character or table styles from one Word document to another in Draft.",
            OfficeKind::Pptx => "Copy layouts, masters or theme assets from one presentation to another in Draft.",
        }
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source_path": {"type": "string", "description": "File to copy assets from"},
                "target_path": {"type": "string", "description": "File to copy assets into"},
                "assets": {
                    "type": "array",
                    "description": "Asset selectors: names, or objects with type/id/name",
                    "items": {}
                }
            },
            "required": ["source_path", "target_path", "assets"]
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let args: CopyArgs = parse_args(arguments)?;
        let source = validate_office_path(&args.source_path, self.kind, "source_path")?;
        let target = validate_office_path(&args.target_path, self.kind, "target_path")?;
        validate_asset_selectors(&args.assets)?;
        self.ctx.ensure_draft().await?;

        let params = json!({
            "workbench_id": self.ctx.workbench_id(),
            "source_path": source,
            "target_path": target,
            "assets": args.assets,
            "root": "draft",
            "source_root": "draft",
            "target_root": "draft",
        });
        let method = match self.kind {
            OfficeKind::Xlsx => "XlsxCopyAssets",
            OfficeKind::Docx => "DocxCopyAssets",
            OfficeKind::Pptx => "PptxCopyAssets",
        };
        self.ctx.call_json_worker(method, params).await
    }
}
