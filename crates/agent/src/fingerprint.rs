//! Tool call fingerprints for loop detection.
//!
//! Two calls that would do the same thing should hash the same even when the
//! model varies whitespace, key order, query casing or irrelevant fields.
//! Each known tool keeps only the arguments that change its effect.

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use workshop_core::message::ToolCall;

/// Short stable hash of a call's name and fingerprint.
pub fn tool_call_hash(call: &ToolCall) -> String {
    let key = format!("{}:{}", call.name, fingerprint(call));
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}

/// Canonical text of the arguments that matter for `call`'s tool.
/// Arguments that are not a JSON object fall back to the trimmed raw text.
pub fn fingerprint(call: &ToolCall) -> String {
    let args = match serde_json::from_str::<Map<String, Value>>(&call.arguments) {
        Ok(args) => args,
        Err(_) => return call.arguments.trim().to_string(),
    };
    let a = Args(&args);

    let canonical = match call.name.trim() {
        "read_file" => json!({
            "path": a.path("path"),
            "sheet": a.text("sheet"),
            "range": a.text("range"),
            "section": a.text("section"),
            "slide_index": a.int("slide_index"),
            "pages": a.text("pages"),
            "line_start": a.int("line_start"),
            "line_count": a.int("line_count"),
        }),
        "table_read_rows" => json!({
            "path": a.path("path"),
            "row_start": a.int("row_start"),
            "row_count": a.int("row_count"),
            "columns": a.list("columns"),
        }),
        "table_query" => json!({
            "path": a.path("path"),
            "query": a.query("query"),
            "window_rows": a.int("window_rows"),
            "window_offset": a.int("window_offset"),
        }),
        "table_export" => json!({
            "path": a.path("path"),
            "query": a.query("query"),
            "target_path": a.path("target_path"),
            "format": a.text("format").to_lowercase(),
            "sheet": a.text("sheet"),
        }),
        "table_update_from_export" => json!({
            "path": a.path("path"),
            "query": a.query("query"),
            "target_path": a.path("target_path"),
            "sheet": a.text("sheet"),
            "mode": a.text("mode").to_lowercase(),
            "start_cell": a.text("start_cell").to_uppercase(),
            "include_header": a.flag("include_header"),
            "create_workbook_if_missing": a.flag("create_workbook_if_missing"),
            "create_sheet_if_missing": a.flag("create_sheet_if_missing"),
            "clear_target_range": a.flag("clear_target_range"),
        }),
        "write_text_file" => json!({ "path": a.path("path") }),
        "xlsx_operations" | "docx_operations" | "pptx_operations" => {
            let ops: Vec<&Map<String, Value>> = args
                .get("operations")
                .and_then(Value::as_array)
                .map(|ops| ops.iter().filter_map(Value::as_object).collect())
                .unwrap_or_default();
            let first = ops.first().copied().map(Args);
            json!({
                "path": a.path("path"),
                "operations": ops.len(),
                "first_op_type": first.as_ref().map(|op| op.text("op")).unwrap_or_default(),
                "first_sheet": first.as_ref().map(|op| op.text("sheet")).unwrap_or_default(),
            })
        }
        _ => Value::Object(args.clone()),
    };
    canonical.to_string()
}

/// Loose accessors over a JSON arguments object. Wrong types read as empty.
struct Args<'a>(&'a Map<String, Value>);

impl Args<'_> {
    fn text(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// Paths match case-insensitively elsewhere in the engine.
    fn path(&self, key: &str) -> String {
        self.text(key).to_lowercase()
    }

    fn int(&self, key: &str) -> i64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or_default(),
            Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
            _ => 0,
        }
    }

    fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.trim().to_string(),
                        other => other.to_string(),
                    })
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lowercased with runs of whitespace collapsed.
    fn query(&self, key: &str) -> String {
        self.text(key)
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &str) -> ToolCall {
        ToolCall::new("c", name, args)
    }

    #[test]
    fn read_file_ignores_whitespace_and_key_order() {
        let a = call("read_file", r#"{"path": " q1.xlsx ", "sheet": "Data"}"#);
        let b = call("read_file", r#"{"sheet":"Data","path":"q1.xlsx","note":"again"}"#);
        assert_eq!(tool_call_hash(&a), tool_call_hash(&b));

        let c = call("read_file", r#"{"path":"q1.xlsx","sheet":"Summary"}"#);
        assert_ne!(tool_call_hash(&a), tool_call_hash(&c));
    }

    #[test]
    fn paths_ignore_case_and_padding() {
        let a = call("read_file", r#"{"path":"Data.csv"}"#);
        let b = call("read_file", r#"{"path":" data.csv "}"#);
        assert_eq!(tool_call_hash(&a), tool_call_hash(&b));

        let c = call("table_export", r#"{"path":"d.csv","query":"q","target_path":"Out.CSV"}"#);
        let d = call("table_export", r#"{"path":"D.csv","query":"q","target_path":"out.csv"}"#);
        assert_eq!(fingerprint(&c), fingerprint(&d));
    }

    #[test]
    fn queries_are_normalized() {
        let a = call("table_query", r#"{"path":"d.csv","query":"SELECT *\n  FROM data"}"#);
        let b = call("table_query", r#"{"path":"d.csv","query":"select * from DATA"}"#);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn operations_keep_count_and_first_op() {
        let a = call(
            "xlsx_operations",
            r#"{"path":"b.xlsx","operations":[{"op":"set_cells","sheet":"S","cells":[1]}]}"#,
        );
        let b = call(
            "xlsx_operations",
            r#"{"path":"b.xlsx","operations":[{"op":"set_cells","sheet":"S","cells":[2]}]}"#,
        );
        assert_eq!(fingerprint(&a), fingerprint(&b));

        let c = call(
            "xlsx_operations",
            r#"{"path":"b.xlsx","operations":[{"op":"set_cells","sheet":"S"},{"op":"x"}]}"#,
        );
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn enums_are_case_insensitive() {
        let a = call("table_export", r#"{"path":"d.csv","query":"q","target_path":"o.csv","format":"CSV"}"#);
        let b = call("table_export", r#"{"path":"d.csv","query":"q","target_path":"o.csv","format":"csv"}"#);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn unparseable_arguments_use_raw_text() {
        assert_eq!(fingerprint(&call("read_file", "  not json ")), "not json");
        assert_eq!(fingerprint(&call("read_file", "[1,2]")), "[1,2]");
    }

    #[test]
    fn same_arguments_on_different_tools_differ() {
        let a = call("get_file_info", r#"{"path":"a.txt"}"#);
        let b = call("get_file_map", r#"{"path":"a.txt"}"#);
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(tool_call_hash(&a), tool_call_hash(&b));
        assert_eq!(tool_call_hash(&a).len(), 16);
    }
}
