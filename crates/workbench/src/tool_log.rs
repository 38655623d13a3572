//! Append-only tool execution ledger (`meta/workshop/tool_log.jsonl`).
//!
//! One JSON object per line. Ids are assigned by [`ToolLog::reserve_id`],
//! seeded from the largest id already on disk, so they keep increasing across
//! runs and phases. The full result of every call stays here even when the
//! model only saw a receipt.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use workshop_core::error::StoreError;
use workshop_core::layout::WorkbenchLayout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolLogEntry {
    pub id: u64,
    pub tool: String,
    /// Raw JSON arguments as the model sent them.
    pub args: String,
    pub result: String,
    pub receipt: String,
    pub ts: String,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

pub struct ToolLog {
    path: PathBuf,
    last_id: AtomicU64,
}

impl ToolLog {
    pub fn open(layout: &WorkbenchLayout) -> Self {
        Self::at(layout.tool_log())
    }

    pub fn at(path: PathBuf) -> Self {
        let last_id = Self::load_entries(&path)
            .iter()
            .map(|e| e.id)
            .max()
            .unwrap_or(0);
        debug!(path = %path.display(), last_id, "Tool log opened");
        Self {
            path,
            last_id: AtomicU64::new(last_id),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Largest id handed out so far.
    pub fn current_id(&self) -> u64 {
        self.last_id.load(Ordering::SeqCst)
    }

    /// Allocate the id for the next entry.
    pub fn reserve_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn append(&self, entry: &ToolLogEntry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }

    /// Append, logging instead of failing. A lost log line must not fail
    /// the tool call it describes.
    pub fn append_or_warn(&self, entry: &ToolLogEntry) {
        if let Err(e) = self.append(entry) {
            warn!(entry_id = entry.id, tool = %entry.tool, error = %e, "Tool log write failed");
        }
    }

    pub fn entry(&self, id: u64) -> Result<ToolLogEntry, StoreError> {
        Self::load_entries(&self.path)
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("tool log entry {id}")))
    }

    pub fn entries(&self) -> Vec<ToolLogEntry> {
        Self::load_entries(&self.path)
    }

    fn load_entries(path: &Path) -> Vec<ToolLogEntry> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Tool log read failed");
                }
                return Vec::new();
            }
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<ToolLogEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted tool log line");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, tool: &str) -> ToolLogEntry {
        ToolLogEntry {
            id,
            tool: tool.into(),
            args: "{}".into(),
            result: format!("result {id}"),
            receipt: format!("receipt {id}"),
            ts: "2024-01-01T00:00:00Z".into(),
            elapsed_ms: 3,
            error: None,
            metadata: None,
        }
    }

    #[test]
    fn ids_continue_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta/workshop/tool_log.jsonl");
        let log = ToolLog::at(path.clone());
        assert_eq!(log.reserve_id(), 1);
        log.append(&entry(1, "list_files")).unwrap();
        assert_eq!(log.reserve_id(), 2);
        log.append(&entry(2, "read_file")).unwrap();

        let reopened = ToolLog::at(path);
        assert_eq!(reopened.current_id(), 2);
        assert_eq!(reopened.reserve_id(), 3);
    }

    #[test]
    fn lookup_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let log = ToolLog::at(dir.path().join("tool_log.jsonl"));
        log.append(&entry(1, "a")).unwrap();
        log.append(&entry(2, "b")).unwrap();
        assert_eq!(log.entry(2).unwrap().tool, "b");
        assert!(matches!(log.entry(9), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn corrupted_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool_log.jsonl");
        let good = serde_json::to_string(&entry(4, "x")).unwrap();
        fs::write(&path, format!("not json\n{good}\n\n")).unwrap();
        let log = ToolLog::at(path);
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.current_id(), 4);
    }

    #[test]
    fn error_field_is_omitted_when_absent() {
        let json = serde_json::to_value(entry(1, "x")).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["elapsed_ms"], 3);
    }
}
