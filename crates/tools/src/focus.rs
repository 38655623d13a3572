//! Focus hints derived from office operations.
//!
//! A hint tells the review UI where an edit landed: the largest edited
//! region of a sheet, the first touched section of a document, or the first
//! touched slide of a deck. Builders only look at the operations; they never
//! consult the file.

use serde_json::Value;
use std::collections::HashMap;

use workshop_core::tool::FocusHint;

/// Parse an A1-style cell reference into 1-based `(row, col)`.
pub fn parse_cell_ref(cell: &str) -> Option<(u32, u32)> {
    let trimmed = cell.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    if split == 0 || split == trimmed.len() {
        return None;
    }
    let (letters, digits) = trimmed.split_at(split);
    let row: u32 = digits.parse().ok().filter(|row| *row > 0)?;
    let col = letters
        .to_ascii_uppercase()
        .bytes()
        .try_fold(0u32, |acc, b| {
            acc.checked_mul(26)?.checked_add(u32::from(b - b'A' + 1))
        })?;
    (col > 0).then_some((row, col))
}

/// Integer field that may arrive as a JSON number or a numeric string.
pub fn int_field(op: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match op.get(*key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn op_name(op: &Value) -> String {
    op.get("op")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_row: u32,
    max_row: u32,
    min_col: u32,
    max_col: u32,
}

impl Bounds {
    fn cell(row: u32, col: u32) -> Self {
        Self {
            min_row: row,
            max_row: row,
            min_col: col,
            max_col: col,
        }
    }

    fn include(&mut self, row: u32, col: u32) {
        self.min_row = self.min_row.min(row);
        self.max_row = self.max_row.max(row);
        self.min_col = self.min_col.min(col);
        self.max_col = self.max_col.max(col);
    }

    fn area(&self) -> u64 {
        u64::from(self.max_row - self.min_row + 1) * u64::from(self.max_col - self.min_col + 1)
    }
}

#[derive(Default)]
struct SheetTracker {
    order: Vec<String>,
    bounds: HashMap<String, Bounds>,
    last_touched: Option<String>,
}

impl SheetTracker {
    fn touch(&mut self, sheet: &str) {
        if sheet.is_empty() {
            return;
        }
        self.last_touched = Some(sheet.to_string());
        if !self.order.iter().any(|s| s == sheet) {
            self.order.push(sheet.to_string());
        }
    }

    fn include(&mut self, sheet: &str, row: u32, col: u32) {
        if sheet.is_empty() {
            return;
        }
        self.touch(sheet);
        self.bounds
            .entry(sheet.to_string())
            .and_modify(|b| b.include(row, col))
            .or_insert_with(|| Bounds::cell(row, col));
    }

    fn into_hint(self) -> Option<FocusHint> {
        let mut best: Option<(&String, u64)> = None;
        for sheet in &self.order {
            if let Some(bounds) = self.bounds.get(sheet) {
                if best.is_none_or(|(_, area)| bounds.area() > area) {
                    best = Some((sheet, bounds.area()));
                }
            }
        }
        let sheet = match best {
            Some((sheet, _)) => sheet.clone(),
            None => self.last_touched.clone().or_else(|| self.order.last().cloned())?,
        };
        let hint = match self.bounds.get(&sheet) {
            Some(b) => FocusHint::Sheet {
                sheet,
                row_start: Some(b.min_row - 1),
                row_end: Some(b.max_row - 1),
                col_start: Some(b.min_col - 1),
                col_end: Some(b.max_col - 1),
            },
            None => FocusHint::Sheet {
                sheet,
                row_start: None,
                row_end: None,
                col_start: None,
                col_end: None,
            },
        };
        Some(hint)
    }
}

/// Hint for spreadsheet operations: the sheet with the largest edited
/// bounding box, ties going to the first sheet touched.
pub fn xlsx_focus_hint(ops: &[Value]) -> Option<FocusHint> {
    let mut tracker = SheetTracker::default();
    for op in ops {
        let sheet = op.get("sheet").and_then(Value::as_str).unwrap_or_default();
        tracker.touch(sheet);
        match op_name(op).as_str() {
            "set_cells" => {
                let Some(cells) = op.get("cells").and_then(Value::as_array) else {
                    continue;
                };
                for cell in cells {
                    let parsed = cell
                        .get("cell")
                        .and_then(Value::as_str)
                        .and_then(parse_cell_ref);
                    if let Some((row, col)) = parsed {
                        tracker.include(sheet, row, col);
                    }
                }
            }
            "set_range" => {
                let start = op.get("start").and_then(Value::as_str).and_then(parse_cell_ref);
                let Some((row, col)) = start else { continue };
                let Some(rows) = op.get("values").and_then(Value::as_array) else {
                    continue;
                };
                let width = rows
                    .iter()
                    .filter_map(Value::as_array)
                    .map(Vec::len)
                    .max()
                    .unwrap_or(0);
                if rows.is_empty() || width == 0 {
                    continue;
                }
                tracker.include(sheet, row, col);
                tracker.include(
                    sheet,
                    row + rows.len() as u32 - 1,
                    col + width as u32 - 1,
                );
            }
            // Sheet-level ops only register the sheet.
            _ => {}
        }
    }
    tracker.into_hint()
}

/// Hint for document operations: the smallest explicit section, or the
/// first section when paragraphs were edited without one.
pub fn docx_focus_hint(ops: &[Value]) -> Option<FocusHint> {
    let mut explicit: Option<i64> = None;
    let mut has_edit = false;
    for op in ops {
        if let Some(idx) = int_field(op, &["section_index", "section"]).filter(|i| *i >= 0) {
            explicit = Some(explicit.map_or(idx, |cur| cur.min(idx)));
            continue;
        }
        if matches!(
            op_name(op).as_str(),
            "set_paragraphs" | "append_paragraph" | "replace_text"
        ) {
            has_edit = true;
        }
    }
    match explicit {
        Some(idx) => Some(FocusHint::Section {
            section_index: idx as u32,
        }),
        None if has_edit => Some(FocusHint::Section { section_index: 0 }),
        None => None,
    }
}

/// Hint for presentation operations: the smallest explicit slide index.
/// `add_slide` targets are resolved from the resulting deck by the caller.
pub fn pptx_focus_hint(ops: &[Value]) -> Option<FocusHint> {
    ops.iter()
        .filter(|op| op_name(op) != "add_slide")
        .filter_map(|op| int_field(op, &["index", "slide_index"]))
        .filter(|idx| *idx >= 0)
        .min()
        .map(|idx| FocusHint::Slide {
            slide_index: idx as u32,
        })
}

pub fn has_add_slide(ops: &[Value]) -> bool {
    ops.iter().any(|op| op_name(op) == "add_slide")
}
