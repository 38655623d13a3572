//! Draft baselines: the text of each office file as it was when the draft
//! opened. Review diffs use it as the "before" side.

use serde_json::{Value, json};
use std::fs;
use tracing::{debug, warn};

use workshop_core::error::{StoreError, ToolError};
use workshop_core::store::{FileKind, WorkbenchStore};
use workshop_core::tool::ToolWorker;
use workshop_workbench::ReviewArtifacts;

/// Worker method that extracts plain text for a file kind.
pub fn extract_method(kind: FileKind) -> Option<&'static str> {
    match kind {
        FileKind::Docx => Some("DocxExtractText"),
        FileKind::Odt => Some("OdtExtractText"),
        FileKind::Xlsx => Some("XlsxExtractText"),
        FileKind::Pptx => Some("PptxExtractText"),
        FileKind::Pdf => Some("PdfExtractText"),
        _ => None,
    }
}

/// Extract the text of a structured file from `root` ("draft", "published"
/// or a staging area name).
pub async fn extract_text(
    worker: &dyn ToolWorker,
    workbench_id: &str,
    root: &str,
    path: &str,
) -> Result<String, ToolError> {
    let kind = FileKind::for_path(path);
    let method = extract_method(kind).ok_or_else(|| {
        ToolError::InvalidArguments(format!("text extraction not supported for {}", kind.as_str()))
    })?;
    let response = worker
        .call(
            method,
            json!({ "workbench_id": workbench_id, "root": root, "path": path }),
        )
        .await?;
    Ok(response
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

/// Capture baselines for every structured file in a freshly opened draft.
///
/// Runs once per draft: an existing baseline directory means the draft was
/// already snapshotted. Individual extraction failures are logged and
/// skipped so one unreadable file does not block editing the others.
pub async fn ensure_draft_baseline(
    store: &dyn WorkbenchStore,
    worker: Option<&dyn ToolWorker>,
    workbench_id: &str,
    draft_id: &str,
) -> Result<(), StoreError> {
    let layout = store.layout(workbench_id)?;
    let dir = layout.baseline_dir(draft_id);
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(&dir)?;

    let files = store.files_list(workbench_id)?;
    let artifacts = ReviewArtifacts::new(layout, draft_id);
    let Some(worker) = worker else {
        if files.iter().any(|f| f.file_kind.is_structured()) {
            warn!(workbench_id, draft_id, "No tool worker; structured baselines skipped");
        }
        return Ok(());
    };

    for file in files.iter().filter(|f| f.file_kind.is_structured()) {
        match extract_text(worker, workbench_id, "draft", &file.path).await {
            Ok(text) => {
                artifacts.write_baseline(&file.path, &text)?;
                debug!(workbench_id, path = %file.path, bytes = text.len(), "Baseline captured");
            }
            Err(e) => {
                warn!(workbench_id, path = %file.path, error = %e, "Baseline extraction failed");
            }
        }
    }
    Ok(())
}
