//! CSV table tools backed by the worker's tabular engine.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use workshop_core::error::ToolError;
use workshop_core::store::FileKind;
use workshop_core::tool::{FocusHint, Tool};

use crate::context::ToolContext;
use crate::focus::parse_cell_ref;
use crate::parse_args;

fn invalid(detail: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments(detail.into())
}

pub fn validate_csv_path<'a>(path: &'a str, field: &str) -> Result<&'a str, ToolError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(invalid(format!("{field} is required")));
    }
    let is_csv = path.to_ascii_lowercase().ends_with(".csv");
    if FileKind::for_path(path) != FileKind::Text || !is_csv {
        return Err(invalid(format!("{field} must be a .csv file")));
    }
    Ok(path)
}

fn extension_is(path: &str, ext: &str) -> bool {
    path.trim()
        .rsplit_once('.')
        .is_some_and(|(_, e)| e.eq_ignore_ascii_case(ext))
}

/// The read-only table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRead {
    GetMap,
    Describe,
    Stats,
    ReadRows,
    Query,
}

impl TableRead {
    pub const ALL: [TableRead; 5] = [
        TableRead::GetMap,
        TableRead::Describe,
        TableRead::Stats,
        TableRead::ReadRows,
        TableRead::Query,
    ];

    fn tool_name(self) -> &'static str {
        match self {
            TableRead::GetMap => "table_get_map",
            TableRead::Describe => "table_describe",
            TableRead::Stats => "table_stats",
            TableRead::ReadRows => "table_read_rows",
            TableRead::Query => "table_query",
        }
    }

    fn method(self) -> &'static str {
        match self {
            TableRead::GetMap => "TabularGetMap",
            TableRead::Describe => "TabularDescribe",
            TableRead::Stats => "TabularGetStats",
            TableRead::ReadRows => "TabularReadRows",
            TableRead::Query => "TabularQuery",
        }
    }
}

#[derive(Deserialize)]
struct TableReadArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    row_start: i64,
    #[serde(default)]
    row_count: i64,
    #[serde(default)]
    query: String,
    #[serde(default)]
    window_rows: Option<i64>,
    #[serde(default)]
    window_offset: Option<i64>,
}

pub struct TableReadTool {
    op: TableRead,
    ctx: Arc<ToolContext>,
}

impl TableReadTool {
    pub fn new(op: TableRead, ctx: Arc<ToolContext>) -> Self {
        Self { op, ctx }
    }

    fn params(&self, args: &TableReadArgs, path: &str) -> Result<Map<String, Value>, ToolError> {
        let mut params = Map::new();
        params.insert("workbench_id".into(), json!(self.ctx.workbench_id()));
        params.insert("path".into(), json!(path));
        params.insert("root".into(), json!(self.ctx.read_root()?));

        match self.op {
            TableRead::GetMap | TableRead::Describe | TableRead::Stats => {}
            TableRead::ReadRows => {
                if args.row_start <= 0 {
                    return Err(invalid("row_start must be >= 1"));
                }
                if args.row_count <= 0 {
                    return Err(invalid("row_count must be >= 1"));
                }
                params.insert("row_start".into(), json!(args.row_start));
                params.insert("row_count".into(), json!(args.row_count));
            }
            TableRead::Query => {
                if args.query.trim().is_empty() {
                    return Err(invalid("query is required"));
                }
                params.insert("query".into(), json!(args.query));
                if let Some(rows) = args.window_rows {
                    if rows <= 0 {
                        return Err(invalid("window_rows must be >= 1"));
                    }
                    params.insert("window_rows".into(), json!(rows));
                }
                if let Some(offset) = args.window_offset {
                    if offset < 0 {
                        return Err(invalid("window_offset must be >= 0"));
                    }
                    params.insert("window_offset".into(), json!(offset));
                }
            }
        }
        if matches!(self.op, TableRead::Stats | TableRead::ReadRows) && !args.columns.is_empty() {
            params.insert("columns".into(), json!(args.columns));
        }
        Ok(params)
    }
}

const CSV_PATH: &str = "CSV file path in the workbench";

#[async_trait]
impl Tool for TableReadTool {
    fn name(&self) -> &str {
        self.op.tool_name()
    }

    fn description(&self) -> &str {
        match self.op {
            TableRead::GetMap => "Get a structural map of a CSV file. Returns column names/types, row count, chunk boundaries, and encoding metadata.",
            TableRead::Describe => "Get detailed per-column metadata for a CSV file, including inferred types, nullability, and distinct-value estimates.",
            TableRead::Stats => "Get summary statistics for CSV columns. Use columns to scope specific fields, or omit for all columns.",
            TableRead::ReadRows => "Read rows from a CSV file by position. Use this to browse tabular data without writing SQL.",
            TableRead::Query => "Run a read-only SQL query against a CSV file. Use table name `data`. Double-quote column names with spaces or special chars. Use window options for pagination.",
        }
    }

    fn parameters_schema(&self) -> Value {
        let columns = json!({"type": "array", "description": "Optional list of column names", "items": {"type": "string"}});
        match self.op {
            TableRead::GetMap | TableRead::Describe => json!({
                "type": "object",
                "properties": {"path": {"type": "string", "description": CSV_PATH}},
                "required": ["path"]
            }),
            TableRead::Stats => json!({
                "type": "object",
                "properties": {"path": {"type": "string", "description": CSV_PATH}, "columns": columns},
                "required": ["path"]
            }),
            TableRead::ReadRows => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": CSV_PATH},
                    "row_start": {"type": "integer", "description": "First row to read (1-based, excluding header)"},
                    "row_count": {"type": "integer", "description": "Number of rows to read"},
                    "columns": columns
                },
                "required": ["path", "row_start", "row_count"]
            }),
            TableRead::Query => json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": CSV_PATH},
                    "query": {"type": "string", "description": "Read-only SQL query. Use table name data."},
                    "window_rows": {"type": "integer", "description": "Optional max rows for this response window"},
                    "window_offset": {"type": "integer", "description": "Optional window offset"}
                },
                "required": ["path", "query"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let args: TableReadArgs = parse_args(arguments)?;
        let path = validate_csv_path(&args.path, "path")?;
        let params = self.params(&args, path)?;
        self.ctx
            .call_json_worker(self.op.method(), Value::Object(params))
            .await
    }
}

/// `table_export`: write a table or query result to a new draft file.
pub struct TableExportTool {
    ctx: Arc<ToolContext>,
}

impl TableExportTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct ExportArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    target_path: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    sheet: String,
}

fn response_str<'a>(response: &'a Value, key: &str) -> Option<&'a str> {
    response
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl Tool for TableExportTool {
    fn name(&self) -> &str {
        "table_export"
    }

    fn description(&self) -> &str {
        "Export CSV table data or query results to a stand-alone Draft file as csv or xlsx."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Source CSV file path in the workbench"},
                "query": {"type": "string", "description": "Optional read-only SQL query. If omitted, exports full table."},
                "target_path": {"type": "string", "description": "Destination path in Draft"},
                "format": {"type": "string", "enum": ["csv", "xlsx"], "description": "Export format"},
                "sheet": {"type": "string", "description": "Optional sheet name for xlsx exports"}
            },
            "required": ["path", "target_path", "format"]
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let args: ExportArgs = parse_args(arguments)?;
        let path = validate_csv_path(&args.path, "path")?;
        let target = args.target_path.trim();
        if target.is_empty() {
            return Err(invalid("target_path is required"));
        }
        let format = args.format.trim().to_ascii_lowercase();
        if format != "csv" && format != "xlsx" {
            return Err(invalid("format must be csv or xlsx"));
        }
        if !extension_is(target, &format) {
            return Err(invalid("target_path extension must match format"));
        }

        self.ctx.ensure_draft().await?;
        let mut params = Map::new();
        params.insert("workbench_id".into(), json!(self.ctx.workbench_id()));
        params.insert("path".into(), json!(path));
        params.insert("root".into(), json!(self.ctx.read_root()?));
        params.insert("target_path".into(), json!(target));
        params.insert("target_root".into(), json!("draft"));
        params.insert("format".into(), json!(format));
        if !args.query.trim().is_empty() {
            params.insert("query".into(), json!(args.query.trim()));
        }
        if !args.sheet.trim().is_empty() {
            params.insert("sheet".into(), json!(args.sheet.trim()));
        }

        let response = self
            .ctx
            .worker()?
            .call("TabularExport", Value::Object(params))
            .await?;

        if format == "xlsx" {
            let written = response_str(&response, "target_path").unwrap_or(target);
            let sheet = response_str(&response, "sheet")
                .or(Some(args.sheet.trim()).filter(|s| !s.is_empty()))
                .unwrap_or("Sheet1");
            self.ctx.set_focus_hint(
                written,
                FocusHint::Sheet {
                    sheet: sheet.to_string(),
                    row_start: Some(0),
                    row_end: None,
                    col_start: Some(0),
                    col_end: None,
                },
            );
        }
        Ok(response.to_string())
    }
}

/// `table_update_from_export`: write table data into an existing draft workbook.
pub struct TableUpdateFromExportTool {
    ctx: Arc<ToolContext>,
}

impl TableUpdateFromExportTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct UpdateArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    target_path: String,
    #[serde(default)]
    sheet: String,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    start_cell: String,
    include_header: Option<bool>,
    create_workbook_if_missing: Option<bool>,
    create_sheet_if_missing: Option<bool>,
    clear_target_range: Option<bool>,
}

/// Top-left cell of a written range such as `Data!$B$2:D9`.
pub fn written_range_origin(range: &str) -> Option<(u32, u32)> {
    let range = range.trim();
    let range = range.rsplit_once('!').map_or(range, |(_, r)| r);
    let first = range.split(':').next().unwrap_or_default();
    parse_cell_ref(&first.replace('$', ""))
}

#[async_trait]
impl Tool for TableUpdateFromExportTool {
    fn name(&self) -> &str {
        "table_update_from_export"
    }

    fn description(&self) -> &str {
        "Write CSV table data/query results into an existing Draft xlsx workbook/sheet."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Source CSV file path in the workbench"},
                "query": {"type": "string", "description": "Optional read-only SQL query. If omitted, uses full table."},
                "target_path": {"type": "string", "description": "Destination .xlsx path in Draft"},
                "sheet": {"type": "string", "description": "Target worksheet name"},
                "mode": {"type": "string", "enum": ["replace_sheet", "append_rows", "write_range"], "description": "Update mode"},
                "start_cell": {"type": "string", "description": "Optional top-left target cell for write_range mode (default A1)"},
                "include_header": {"type": "boolean", "description": "Whether to include CSV header row in written output"},
                "create_workbook_if_missing": {"type": "boolean", "description": "Create workbook if target does not exist"},
                "create_sheet_if_missing": {"type": "boolean", "description": "Create sheet if target sheet does not exist"},
                "clear_target_range": {"type": "boolean", "description": "For write_range mode, clear destination range before writing"}
            },
            "required": ["path", "target_path", "sheet", "mode"]
        })
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let args: UpdateArgs = parse_args(arguments)?;
        let path = validate_csv_path(&args.path, "path")?;
        let target = args.target_path.trim();
        if target.is_empty() {
            return Err(invalid("target_path is required"));
        }
        if !extension_is(target, "xlsx") {
            return Err(invalid("target_path must be a .xlsx file"));
        }
        let sheet = args.sheet.trim();
        if sheet.is_empty() {
            return Err(invalid("sheet is required"));
        }
        let mode = args.mode.trim().to_ascii_lowercase();
        if !matches!(mode.as_str(), "replace_sheet" | "append_rows" | "write_range") {
            return Err(invalid(
                "mode must be replace_sheet, append_rows, or write_range",
            ));
        }
        let start_cell = match args.start_cell.trim() {
            "" => "A1",
            cell => cell,
        };
        if mode == "write_range" && parse_cell_ref(start_cell).is_none() {
            return Err(invalid("start_cell must be an A1-style cell reference"));
        }
        if args.clear_target_range.is_some() && mode != "write_range" {
            return Err(invalid(
                "clear_target_range is only supported for mode write_range",
            ));
        }

        self.ctx.ensure_draft().await?;
        let mut params = Map::new();
        params.insert("workbench_id".into(), json!(self.ctx.workbench_id()));
        params.insert("path".into(), json!(path));
        params.insert("root".into(), json!("draft"));
        params.insert("target_path".into(), json!(target));
        params.insert("target_root".into(), json!("draft"));
        params.insert("sheet".into(), json!(sheet));
        params.insert("mode".into(), json!(mode));
        if !args.query.trim().is_empty() {
            params.insert("query".into(), json!(args.query.trim()));
        }
        if mode == "write_range" {
            params.insert("start_cell".into(), json!(start_cell));
        }
        let flags = [
            ("include_header", args.include_header),
            ("create_workbook_if_missing", args.create_workbook_if_missing),
            ("create_sheet_if_missing", args.create_sheet_if_missing),
            ("clear_target_range", args.clear_target_range),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                params.insert(key.into(), json!(value));
            }
        }

        let response = self
            .ctx
            .worker()?
            .call("TabularUpdateFromExport", Value::Object(params))
            .await?;

        let written = response_str(&response, "target_path").unwrap_or(target);
        let focus_sheet = response_str(&response, "sheet").unwrap_or(sheet);
        let (row, col) = response_str(&response, "written_range")
            .and_then(written_range_origin)
            .unwrap_or((1, 1));
        self.ctx.set_focus_hint(
            written,
            FocusHint::Sheet {
                sheet: focus_sheet.to_string(),
                row_start: Some(row - 1),
                row_end: None,
                col_start: Some(col - 1),
                col_end: None,
            },
        );
        Ok(response.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeWorker, workbench_with};
    use workshop_core::tool::ToolWorker;

    fn ctx_with(worker: FakeWorker) -> (tempfile::TempDir, Arc<FakeWorker>, Arc<ToolContext>) {
        let (dir, store, wb) = workbench_with(&[("sales.csv", "region,amount\nN,1\n")]);
        let worker = Arc::new(worker);
        let ctx = ToolContext::new(wb, Arc::new(store), Some(worker.clone() as Arc<dyn ToolWorker>));
        (dir, worker, Arc::new(ctx))
    }

    #[test]
    fn csv_paths_only() {
        assert!(validate_csv_path("sales.csv", "path").is_ok());
        assert!(validate_csv_path("sales.CSV ", "path").is_ok());
        let err = validate_csv_path("notes.txt", "path").unwrap_err();
        assert!(err.to_string().contains("path must be a .csv file"));
        assert!(validate_csv_path("", "path").is_err());
    }

    #[test]
    fn written_range_origins() {
        assert_eq!(written_range_origin("Data!$B$2:D9"), Some((2, 2)));
        assert_eq!(written_range_origin("C5"), Some((5, 3)));
        assert_eq!(written_range_origin(""), None);
    }

    #[tokio::test]
    async fn read_rows_validates_window() {
        let (_dir, worker, ctx) = ctx_with(FakeWorker::new());
        let tool = TableReadTool::new(TableRead::ReadRows, ctx);
        let err = tool
            .execute(json!({"path": "sales.csv", "row_start": 0, "row_count": 5}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("row_start must be >= 1"));
        assert!(worker.calls("TabularReadRows").is_empty());
    }

    #[tokio::test]
    async fn query_passes_through_published_root() {
        let worker = FakeWorker::new().respond("TabularQuery", json!({"rows": [[1]]}));
        let (_dir, worker, ctx) = ctx_with(worker);
        let tool = TableReadTool::new(TableRead::Query, ctx);
        let out = tool
            .execute(json!({"path": "sales.csv", "query": "SELECT 1", "window_rows": 10}))
            .await
            .unwrap();
        assert_eq!(out, r#"{"rows":[[1]]}"#);
        let call = &worker.calls("TabularQuery")[0];
        assert_eq!(call["root"], "published");
        assert_eq!(call["window_rows"], 10);
        assert!(call.get("window_offset").is_none());
    }

    #[tokio::test]
    async fn export_extension_must_match() {
        let (_dir, _worker, ctx) = ctx_with(FakeWorker::new());
        let err = TableExportTool::new(ctx)
            .execute(json!({"path": "sales.csv", "target_path": "out.csv", "format": "xlsx"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("extension must match"));
    }

    #[tokio::test]
    async fn xlsx_export_records_sheet_hint() {
        let worker = FakeWorker::new().respond(
            "TabularExport",
            json!({"target_path": "summary.xlsx", "format": "xlsx", "row_count": 1}),
        );
        let (_dir, _worker, ctx) = ctx_with(worker);
        TableExportTool::new(ctx.clone())
            .execute(json!({"path": "sales.csv", "target_path": "summary.xlsx", "format": "xlsx"}))
            .await
            .unwrap();
        match ctx.focus_hints().get("summary.xlsx") {
            Some(FocusHint::Sheet { sheet, row_start, .. }) => {
                assert_eq!(sheet, "Sheet1");
                assert_eq!(*row_start, Some(0));
            }
            other => panic!("unexpected hint {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_rejects_clear_outside_write_range() {
        let (_dir, _worker, ctx) = ctx_with(FakeWorker::new());
        let err = TableUpdateFromExportTool::new(ctx)
            .execute(json!({
                "path": "sales.csv", "target_path": "q1.xlsx", "sheet": "Data",
                "mode": "append_rows", "clear_target_range": true
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("clear_target_range"));
    }

    #[tokio::test]
    async fn update_hint_uses_written_range() {
        let worker = FakeWorker::new().respond(
            "TabularUpdateFromExport",
            json!({"sheet": "Data", "written_range": "Data!B3:C9"}),
        );
        let (_dir, _worker, ctx) = ctx_with(worker);
        TableUpdateFromExportTool::new(ctx.clone())
            .execute(json!({
                "path": "sales.csv", "target_path": "q1.xlsx", "sheet": "Data", "mode": "write_range", "start_cell": "B3"
            }))
            .await
            .unwrap();
        assert!(matches!(
            ctx.focus_hints().get("q1.xlsx"),
            Some(FocusHint::Sheet { row_start: Some(2), col_start: Some(1), .. })
        ));
    }
}
