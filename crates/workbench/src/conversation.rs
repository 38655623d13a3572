//! The per-workbench conversation log (`meta/conversation.jsonl`).

use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

use workshop_core::error::StoreError;
use workshop_core::layout::WorkbenchLayout;
use workshop_core::message::ConversationEntry;

use crate::fsutil::atomic_write;

pub struct ConversationLog {
    path: PathBuf,
}

impl ConversationLog {
    pub fn open(layout: &WorkbenchLayout) -> Self {
        Self {
            path: layout.conversation(),
        }
    }

    /// All entries in order. Unparseable lines are skipped; entries without
    /// an id get `legacy-<line>`.
    pub fn read(&self) -> Result<Vec<ConversationEntry>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for (i, line) in content.split('\n').enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut entry: ConversationEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(line = i, error = %e, "Skipping unreadable conversation line");
                    continue;
                }
            };
            if entry.entry_type.is_none() && entry.role.is_some() {
                entry.entry_type = Some(entry.kind());
            }
            if entry.message_id.is_empty() {
                entry.message_id = format!("legacy-{i}");
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn append(&self, entry: &ConversationEntry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }

    /// Replace the whole log. Only undo and metadata updates do this.
    pub fn rewrite(&self, entries: &[ConversationEntry]) -> Result<(), StoreError> {
        let mut data = Vec::new();
        for entry in entries {
            data.extend(serde_json::to_vec(entry)?);
            data.push(b'\n');
        }
        atomic_write(&self.path, &data)?;
        Ok(())
    }

    /// Index of the last entry with this id.
    pub fn find_index(entries: &[ConversationEntry], message_id: &str) -> Option<usize> {
        entries.iter().rposition(|e| e.message_id == message_id)
    }

    /// Merge keys into an entry's metadata.
    pub fn update_metadata(
        &self,
        message_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let message_id = message_id.trim();
        if message_id.is_empty() || metadata.is_empty() {
            return Ok(());
        }
        let mut entries = self.read()?;
        let idx = Self::find_index(&entries, message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;
        entries[idx]
            .metadata
            .get_or_insert_with(Map::new)
            .extend(metadata);
        self.rewrite(&entries)
    }

    /// Keep entries up to and including `message_id`. Returns the kept
    /// entries and the ones that were dropped.
    pub fn truncate_after(
        &self,
        message_id: &str,
    ) -> Result<(Vec<ConversationEntry>, Vec<ConversationEntry>), StoreError> {
        let mut entries = self.read()?;
        let idx = Self::find_index(&entries, message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;
        let dropped = entries.split_off(idx + 1);
        self.rewrite(&entries)?;
        Ok((entries, dropped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use workshop_core::message::EntryType;

    fn log() -> (tempfile::TempDir, ConversationLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::open(&WorkbenchLayout::new(dir.path()));
        (dir, log)
    }

    #[test]
    fn append_and_read_back() {
        let (_dir, log) = log();
        log.append(&ConversationEntry::user("u-1", "hello")).unwrap();
        log.append(&ConversationEntry::assistant("a-1", "hi")).unwrap();
        let entries = log.read().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].kind(), EntryType::AssistantMessage);
    }

    #[test]
    fn legacy_lines_get_ids_and_types() {
        let (dir, log) = log();
        let path = dir.path().join("meta/conversation.jsonl");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "{\"role\":\"user\",\"content\":\"old\"}\ngarbage\n{\"role\":\"assistant\",\"content\":\"reply\"}\n",
        )
        .unwrap();
        let entries = log.read().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message_id, "legacy-0");
        assert_eq!(entries[0].entry_type, Some(EntryType::UserMessage));
        assert_eq!(entries[1].message_id, "legacy-2");
    }

    #[test]
    fn update_metadata_merges() {
        let (_dir, log) = log();
        log.append(&ConversationEntry::user("u-1", "q")).unwrap();
        let mut first = Map::new();
        first.insert("a".into(), json!(1));
        log.update_metadata("u-1", first).unwrap();
        let mut second = Map::new();
        second.insert("job_elapsed_ms".into(), json!(42));
        log.update_metadata("u-1", second).unwrap();

        let entry = &log.read().unwrap()[0];
        let meta = entry.metadata.as_ref().unwrap();
        assert_eq!(meta["a"], 1);
        assert_eq!(meta["job_elapsed_ms"], 42);
        assert!(log.update_metadata("missing", Map::from_iter([("x".into(), json!(1))])).is_err());
    }

    #[test]
    fn truncate_keeps_target() {
        let (_dir, log) = log();
        for id in ["u-1", "a-1", "u-2", "a-2"] {
            log.append(&ConversationEntry::user(id, id)).unwrap();
        }
        let (kept, dropped) = log.truncate_after("a-1").unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(dropped.len(), 2);
        assert_eq!(log.read().unwrap().last().unwrap().message_id, "a-1");
    }
}
