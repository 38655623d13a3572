//! Receipts: compact stand-ins for oversized tool results.
//!
//! The model sees a receipt (shape, a short preview and the tool log entry
//! id); the full result stays in the tool log and can be fetched with
//! `recall_tool_result`.

use serde_json::{Map, Value};
use std::fmt::Write;

use workshop_config::ReceiptConfig;

/// Tools whose output is data rather than an action report.
pub const DATA_TOOLS: &[&str] = &[
    "table_query",
    "table_read_rows",
    "table_describe",
    "table_stats",
    "table_get_map",
    "read_file",
    "get_file_map",
    "get_file_info",
    "list_files",
    "xlsx_get_styles",
    "docx_get_styles",
    "pptx_get_styles",
];

pub fn is_data_tool(tool_name: &str) -> bool {
    DATA_TOOLS.contains(&tool_name)
}

#[derive(Debug, Clone)]
pub struct ReceiptBuilder {
    size_threshold: usize,
    preview_rows: usize,
    preview_lines: usize,
}

impl Default for ReceiptBuilder {
    fn default() -> Self {
        Self::new(&ReceiptConfig::default())
    }
}

impl ReceiptBuilder {
    pub fn new(config: &ReceiptConfig) -> Self {
        Self {
            size_threshold: config.size_threshold,
            preview_rows: config.preview_rows,
            preview_lines: config.preview_lines,
        }
    }

    pub fn size_threshold(&self) -> usize {
        self.size_threshold
    }

    /// The text handed back to the model for a result logged as entry
    /// `entry_id`. Small results and action tool results pass through.
    pub fn build(&self, tool_name: &str, result: &str, entry_id: u64) -> String {
        if result.len() <= self.size_threshold || !is_data_tool(tool_name) {
            return result.to_string();
        }
        match serde_json::from_str::<Value>(result) {
            Ok(Value::Object(map)) => self.object_receipt(&map, entry_id),
            Ok(Value::Array(items)) => self.array_receipt(&items, entry_id),
            _ => self.text_receipt(result, entry_id),
        }
    }

    /// Placeholder for an oversized result replayed from history.
    pub fn historical(&self, result: &str) -> String {
        if result.len() <= self.size_threshold {
            return result.to_string();
        }
        format!(
            "[Historical tool result, {} bytes. Data was logged at execution time.]",
            result.len()
        )
    }

    fn text_receipt(&self, result: &str, entry_id: u64) -> String {
        let total_lines = result.split('\n').count();
        let preview: Vec<&str> = result.split('\n').take(self.preview_lines).collect();
        format!(
            "[Receipt — {} bytes, {} lines]\nPreview (first {} lines):\n{}\n\n{}",
            result.len(),
            total_lines,
            preview.len(),
            preview.join("\n"),
            footer(entry_id)
        )
    }

    fn array_receipt(&self, items: &[Value], entry_id: u64) -> String {
        let preview = &items[..items.len().min(self.preview_rows)];
        format!(
            "[Receipt — array, {} items]\nPreview (first {}):\n{}\n\n{}",
            items.len(),
            preview.len(),
            Value::Array(preview.to_vec()),
            footer(entry_id)
        )
    }

    fn object_receipt(&self, map: &Map<String, Value>, entry_id: u64) -> String {
        let mut out = String::from("[Receipt");
        if let Some(rows) = map.get("row_count").and_then(Value::as_f64) {
            let _ = write!(out, " — {} rows", rows as i64);
        }
        if let Some(total) = map.get("total_rows").and_then(Value::as_f64) {
            let _ = write!(out, ", {} total", total as i64);
        }
        if map.get("has_more").and_then(Value::as_bool) == Some(true) {
            out.push_str(", has_more=true");
        }
        out.push_str("]\n");

        if let Some(columns) = map.get("columns") {
            let _ = writeln!(out, "Columns: {columns}");
        }

        let sample = [("rows", "rows"), ("data", "items")]
            .into_iter()
            .find_map(|(key, unit)| match map.get(key) {
                Some(Value::Array(items)) if !items.is_empty() => Some((items, unit)),
                _ => None,
            });
        if let Some((items, unit)) = sample {
            let preview = &items[..items.len().min(self.preview_rows)];
            let pretty = serde_json::to_string_pretty(preview).unwrap_or_default();
            let _ = writeln!(
                out,
                "Preview ({} of {} {unit}):\n{pretty}",
                preview.len(),
                items.len()
            );
        }

        out.push('\n');
        out.push_str(&footer(entry_id));
        out
    }
}

fn footer(entry_id: u64) -> String {
    format!("Full result in tool log entry #{entry_id}. Use recall_tool_result to retrieve.")
}
