//! Read-only file tools: listing, metadata, structural maps and content.
//!
//! All of them read from the draft when one is open, otherwise from
//! published. Office formats are delegated to the tool worker; plain text is
//! read from the store directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use workshop_core::error::ToolError;
use workshop_core::store::{FileEntry, FileKind};
use workshop_core::tool::Tool;

use crate::context::ToolContext;
use crate::{parse_args, path_schema};

const TEXT_MAP_CHUNK_LINES: usize = 200;

fn require_file(ctx: &ToolContext, path: &str) -> Result<FileEntry, ToolError> {
    if path.trim().is_empty() {
        return Err(ToolError::InvalidArguments("path is required".into()));
    }
    ctx.find_file(path)?
        .ok_or_else(|| ToolError::InvalidArguments(format!("file not found: {path}")))
}

fn worker_params(ctx: &ToolContext, path: &str, root: &str) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("workbench_id".into(), json!(ctx.workbench_id()));
    params.insert("path".into(), json!(path));
    params.insert("root".into(), json!(root));
    params
}

#[derive(Deserialize)]
struct PathArgs {
    #[serde(default)]
    path: String,
}

/// `list_files`
pub struct ListFilesTool {
    ctx: Arc<ToolContext>,
}

impl ListFilesTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Serialize)]
struct ListedFile<'a> {
    path: &'a str,
    kind: &'static str,
    size_bytes: u64,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    is_opaque: bool,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List all files in the workbench with their metadata (path, type, size). Use this first to see what files are available."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _arguments: Value) -> Result<String, ToolError> {
        let files = self.ctx.files()?;
        let listed: Vec<ListedFile<'_>> = files
            .iter()
            .map(|f| ListedFile {
                path: &f.path,
                kind: f.file_kind.as_str(),
                size_bytes: f.size,
                mime_type: &f.mime_type,
                is_opaque: f.is_opaque,
            })
            .collect();
        serde_json::to_string(&listed).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "list_files".into(),
            reason: e.to_string(),
        })
    }
}

/// `get_file_info`
pub struct GetFileInfoTool {
    ctx: Arc<ToolContext>,
}

impl GetFileInfoTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    /// Extra worker-provided details; worker failures leave them out.
    async fn enrich(&self, entry: &FileEntry, root: &str, info: &mut Map<String, Value>) {
        let method = match entry.file_kind {
            FileKind::Xlsx => "XlsxGetInfo",
            FileKind::Pdf => "PdfGetInfo",
            FileKind::Image => "ImageGetMetadata",
            _ => return,
        };
        let Ok(worker) = self.ctx.worker() else { return };
        let params = worker_params(&self.ctx, &entry.path, root);
        let Ok(response) = worker.call(method, Value::Object(params)).await else {
            return;
        };
        let keys: &[&str] = match entry.file_kind {
            FileKind::Xlsx => &["sheets"],
            FileKind::Pdf => &["page_count"],
            _ => &["width", "height", "format"],
        };
        for key in keys {
            if let Some(value) = response.get(*key) {
                info.insert((*key).to_string(), value.clone());
            }
        }
    }
}

#[async_trait]
impl Tool for GetFileInfoTool {
    fn name(&self) -> &str {
        "get_file_info"
    }

    fn description(&self) -> &str {
        "Get detailed information about a specific file. For xlsx returns sheet names and dimensions. For pdf returns page count. For images returns dimensions."
    }

    fn parameters_schema(&self) -> Value {
        path_schema("File path in the workbench")
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let args: PathArgs = parse_args(arguments)?;
        let entry = require_file(&self.ctx, &args.path)?;
        let root = self.ctx.read_root()?;

        let mut info = Map::new();
        info.insert("path".into(), json!(entry.path));
        info.insert("kind".into(), json!(entry.file_kind.as_str()));
        info.insert("size".into(), json!(entry.size));
        info.insert("mime_type".into(), json!(entry.mime_type));
        self.enrich(&entry, root, &mut info).await;
        Ok(Value::Object(info).to_string())
    }
}

/// `get_file_map`
pub struct GetFileMapTool {
    ctx: Arc<ToolContext>,
}

impl GetFileMapTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

/// Line-chunk map of a text file, used when the worker cannot build one.
pub fn text_map(content: &str) -> Value {
    let line_count = content.split('\n').count();
    let chunks: Vec<Value> = (1..=line_count)
        .step_by(TEXT_MAP_CHUNK_LINES)
        .enumerate()
        .map(|(index, start)| {
            let end = (start + TEXT_MAP_CHUNK_LINES - 1).min(line_count);
            json!({"index": index, "lines": format!("{start}-{end}")})
        })
        .collect();
    json!({
        "line_count": line_count,
        "char_count": content.len(),
        "chunks": chunks,
    })
}

fn is_csv(path: &str) -> bool {
    path.trim().to_ascii_lowercase().ends_with(".csv")
}

#[async_trait]
impl Tool for GetFileMapTool {
    fn name(&self) -> &str {
        "get_file_map"
    }

    fn description(&self) -> &str {
        "Get a structural map of a file showing its internal layout without reading content. \
         xlsx: sheets with used ranges and chunk boundaries; docx: sections by heading; \
         pptx: slides with titles; pdf: page count and chunks; csv: tabular schema; \
         text: line count and line chunks. Use read_file with specific coordinates afterwards."
    }

    fn parameters_schema(&self) -> Value {
        path_schema("File path in the workbench")
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let args: PathArgs = parse_args(arguments)?;
        let entry = require_file(&self.ctx, &args.path)?;
        let root = self.ctx.read_root()?;
        let params = Value::Object(worker_params(&self.ctx, &entry.path, root));

        let method = match entry.file_kind {
            FileKind::Xlsx => "XlsxGetMap",
            FileKind::Docx => "DocxGetMap",
            FileKind::Pptx => "PptxGetMap",
            FileKind::Pdf => "PdfGetMap",
            FileKind::Text if is_csv(&entry.path) => "TabularGetMap",
            FileKind::Text => {
                if let Ok(worker) = self.ctx.worker() {
                    if let Ok(map) = worker.call("TextGetMap", params).await {
                        return Ok(map.to_string());
                    }
                }
                let area = self.ctx.read_area()?;
                let content = self
                    .ctx
                    .store()
                    .read_file(self.ctx.workbench_id(), &area, &entry.path)?;
                return Ok(text_map(&content).to_string());
            }
            _ if entry.is_opaque => {
                return Ok(json!({
                    "error": format!("opaque file, no structural map available for {}", entry.path)
                })
                .to_string());
            }
            kind => {
                return Ok(json!({
                    "error": format!("no structural map available for file kind: {}", kind.as_str())
                })
                .to_string());
            }
        };
        let response = self.ctx.worker()?.call(method, params).await?;
        Ok(response.to_string())
    }
}

/// `read_file`
pub struct ReadFileTool {
    ctx: Arc<ToolContext>,
}

impl ReadFileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct ReadFileArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    sheet: String,
    #[serde(default)]
    range: String,
    #[serde(default)]
    section: Option<Value>,
    #[serde(default)]
    slide_index: Option<i64>,
    #[serde(default)]
    pages: String,
    #[serde(default)]
    line_start: Option<i64>,
    #[serde(default)]
    line_count: Option<i64>,
}

/// Slice `content` to `line_count` lines starting at 1-based `line_start`.
pub fn slice_lines(content: &str, line_start: Option<i64>, line_count: Option<i64>) -> String {
    let start = line_start.unwrap_or(1).max(1) as usize;
    let lines = content.split('\n').skip(start - 1);
    match line_count {
        Some(n) if n > 0 => lines.take(n as usize).collect::<Vec<_>>().join("\n"),
        _ => lines.collect::<Vec<_>>().join("\n"),
    }
}

impl ReadFileTool {
    async fn read_text(&self, entry: &FileEntry, args: &ReadFileArgs, root: &str) -> Result<String, ToolError> {
        let windowed = args.line_start.is_some() || args.line_count.is_some();
        if windowed {
            if let Ok(worker) = self.ctx.worker() {
                let mut params = worker_params(&self.ctx, &entry.path, root);
                if let Some(start) = args.line_start {
                    params.insert("line_start".into(), json!(start));
                }
                if let Some(count) = args.line_count {
                    params.insert("line_count".into(), json!(count));
                }
                if let Ok(response) = worker.call("TextReadLines", Value::Object(params)).await {
                    return Ok(response.to_string());
                }
            }
        }
        let area = self.ctx.read_area()?;
        let content = self
            .ctx
            .store()
            .read_file(self.ctx.workbench_id(), &area, &entry.path)?;
        if windowed {
            return Ok(slice_lines(&content, args.line_start, args.line_count));
        }
        Ok(content)
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read content from a file. For large files, use get_file_map first, then read specific regions: \
         xlsx: sheet name and optional range (e.g. A1:E50); docx: section heading or index; \
         pptx: slide_index (0-based); pdf: pages range (e.g. \"1-5\"); text: line_start and line_count."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path in the workbench"},
                "sheet": {"type": "string", "description": "Sheet name (xlsx only)"},
                "range": {"type": "string", "description": "Cell range like A1:D100 (xlsx only, optional)"},
                "section": {"type": "string", "description": "Section heading text or index (docx only)"},
                "slide_index": {"type": "integer", "description": "Slide index, 0-based (pptx only)"},
                "pages": {"type": "string", "description": "Page range like '1-5' (pdf only)"},
                "line_start": {"type": "integer", "description": "Starting line number, 1-indexed (text only)"},
                "line_count": {"type": "integer", "description": "Number of lines to read (text only)"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let args: ReadFileArgs = parse_args(arguments)?;
        let entry = require_file(&self.ctx, &args.path)?;
        let root = self.ctx.read_root()?;
        let mut params = worker_params(&self.ctx, &entry.path, root);

        let method = match entry.file_kind {
            FileKind::Text => return self.read_text(&entry, &args, root).await,
            FileKind::Image => {
                return Ok(format!(
                    "Image file: {} (use get_file_info for metadata)",
                    entry.path
                ));
            }
            FileKind::Binary => {
                return Ok(format!(
                    "Binary/opaque file: {} (content not readable)",
                    entry.path
                ));
            }
            FileKind::Xlsx => {
                if !args.range.is_empty() {
                    params.insert("range".into(), json!(args.range));
                }
                if args.sheet.is_empty() {
                    "XlsxExtractText"
                } else {
                    params.insert("sheet".into(), json!(args.sheet));
                    "XlsxReadRange"
                }
            }
            FileKind::Docx => {
                if let Some(section) = args.section.as_ref().filter(|s| !s.is_null()) {
                    params.insert("section".into(), section.clone());
                }
                "DocxExtractText"
            }
            FileKind::Pptx => {
                if let Some(index) = args.slide_index {
                    params.insert("slide_index".into(), json!(index));
                }
                "PptxExtractText"
            }
            FileKind::Pdf => {
                if !args.pages.is_empty() {
                    params.insert("pages".into(), json!(args.pages));
                }
                "PdfExtractText"
            }
            FileKind::Odt => {
                let text = crate::baseline::extract_text(
                    self.ctx.worker()?,
                    self.ctx.workbench_id(),
                    root,
                    &entry.path,
                )
                .await?;
                return Ok(text);
            }
        };
        let response = self.ctx.worker()?.call(method, Value::Object(params)).await?;
        Ok(response.to_string())
    }
}
