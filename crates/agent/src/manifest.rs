//! The file manifest placed in phase prompts.
//!
//! The full manifest carries a structural map per file (or the content of
//! small text files) so the model can target reads without discovery calls.
//! The lightweight one lists names, kinds and sizes only.

use serde_json::json;
use std::fmt::Write;
use tracing::warn;

use workshop_core::error::{Error, Result};
use workshop_core::store::{Area, FileEntry, FileKind, WorkbenchStore};
use workshop_core::tool::ToolWorker;

/// Text files up to this size are inlined instead of mapped.
pub const SMALL_TEXT_FILE_BYTES: u64 = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestDetail {
    Full,
    Lightweight,
}

pub async fn build_manifest(
    store: &dyn WorkbenchStore,
    worker: Option<&dyn ToolWorker>,
    workbench_id: &str,
    detail: ManifestDetail,
) -> Result<String> {
    let files = store
        .files_list(workbench_id)
        .map_err(|e| Error::FileRead(format!("failed to assemble file manifest: {e}")))?;
    let area = match store.draft_state(workbench_id) {
        Ok(Some(_)) => Area::Draft,
        _ => Area::Published,
    };

    let mut out = String::from("Current workbench files:\n\n");
    for file in &files {
        let _ = write!(
            out,
            "## {}\n- Type: {}, Size: {} bytes",
            file.path,
            file.file_kind.as_str(),
            file.size
        );
        if file.is_opaque {
            out.push_str(" (opaque)");
        }
        out.push('\n');
        if detail == ManifestDetail::Full {
            describe_file(&mut out, store, worker, workbench_id, &area, file).await;
        }
        out.push('\n');
    }
    Ok(out)
}

async fn describe_file(
    out: &mut String,
    store: &dyn WorkbenchStore,
    worker: Option<&dyn ToolWorker>,
    workbench_id: &str,
    area: &Area,
    file: &FileEntry,
) {
    let map = || file_map(worker, workbench_id, area, file);
    match file.file_kind {
        FileKind::Xlsx | FileKind::Docx | FileKind::Pptx | FileKind::Pdf => match map().await {
            Some(map) => push_map(out, &map),
            None => out.push_str("- Map: unavailable (use get_file_map tool to retrieve)\n"),
        },
        FileKind::Text if is_csv(&file.path) => match map().await {
            Some(map) => push_map(out, &map),
            None => out.push_str("- CSV map unavailable (use table_get_map tool to retrieve)\n"),
        },
        FileKind::Text if file.size <= SMALL_TEXT_FILE_BYTES => {
            match store.read_file(workbench_id, area, &file.path) {
                Ok(content) => {
                    let _ = write!(out, "- Content:\n```\n{content}\n```\n");
                }
                Err(_) => out.push_str("- Content: unavailable\n"),
            }
        }
        FileKind::Text => match map().await {
            Some(map) => push_map(out, &map),
            None => {
                let _ = writeln!(
                    out,
                    "- Large text file ({} bytes). Use read_file with line_start/line_count.",
                    file.size
                );
            }
        },
        FileKind::Image => {
            out.push_str("- Image file (read-only, use get_file_info for metadata)\n");
        }
        _ if file.is_opaque => {
            out.push_str("- Opaque/binary file (content not directly readable)\n");
        }
        _ => out.push_str("- Use read_file to access content\n"),
    }
}

fn push_map(out: &mut String, map: &str) {
    let _ = write!(out, "- Map:\n```json\n{map}\n```\n");
}

fn is_csv(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".csv")
}

/// The worker's structural map, or `None` when it cannot provide one.
async fn file_map(
    worker: Option<&dyn ToolWorker>,
    workbench_id: &str,
    area: &Area,
    file: &FileEntry,
) -> Option<String> {
    let worker = worker?;
    let method = match file.file_kind {
        FileKind::Xlsx => "XlsxGetMap",
        FileKind::Docx => "DocxGetMap",
        FileKind::Pptx => "PptxGetMap",
        FileKind::Pdf => "PdfGetMap",
        FileKind::Text if is_csv(&file.path) => "TabularGetMap",
        FileKind::Text => "TextGetMap",
        _ => return None,
    };
    let params = json!({
        "workbench_id": workbench_id,
        "path": file.path,
        "root": area.dir_name(),
    });
    match worker.call(method, params).await {
        Ok(map) => Some(map.to_string()),
        Err(e) => {
            warn!(workbench_id, path = %file.path, method, error = %e, "Manifest map unavailable");
            None
        }
    }
}
