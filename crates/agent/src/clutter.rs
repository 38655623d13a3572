//! Pending clutter: an approximate token count for assistant text that has
//! streamed but is not yet persisted in the conversation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use workshop_config::ClutterConfig;

#[derive(Debug, Default)]
struct Pending {
    chars: usize,
    last_emit: Option<Instant>,
}

/// Per-workbench streamed character counts with throttled change signals.
#[derive(Debug)]
pub struct ClutterCounter {
    emit_interval: Duration,
    pending: Mutex<HashMap<String, Pending>>,
}

impl Default for ClutterCounter {
    fn default() -> Self {
        Self::new(&ClutterConfig::default())
    }
}

impl ClutterCounter {
    pub fn new(config: &ClutterConfig) -> Self {
        Self {
            emit_interval: Duration::from_millis(config.emit_interval_ms),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count a streamed delta. Returns the pending token estimate when a
    /// change notification is due.
    pub fn add(&self, workbench_id: &str, delta: &str) -> Option<u64> {
        if workbench_id.is_empty() || delta.is_empty() {
            return None;
        }
        let now = Instant::now();
        let mut pending = self.lock();
        let entry = pending.entry(workbench_id.to_string()).or_default();
        entry.chars += delta.chars().count();
        let due = entry
            .last_emit
            .is_none_or(|last| now.duration_since(last) >= self.emit_interval);
        if !due {
            return None;
        }
        entry.last_emit = Some(now);
        Some((entry.chars / 4) as u64)
    }

    pub fn pending_tokens(&self, workbench_id: &str) -> u64 {
        self.lock()
            .get(workbench_id)
            .map(|p| (p.chars / 4) as u64)
            .unwrap_or_default()
    }

    /// Forget the workbench's pending text once it has been persisted.
    pub fn clear(&self, workbench_id: &str) {
        self.lock().remove(workbench_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn emits_at_most_once_per_interval() {
        let counter = ClutterCounter::default();
        assert_eq!(counter.add("wb", &"a".repeat(40)), Some(10));
        assert_eq!(counter.add("wb", "bbbb"), None);
        assert_eq!(counter.pending_tokens("wb"), 11);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(counter.add("wb", "cccc"), Some(12));
    }

    #[test]
    fn workbenches_are_independent_and_clear() {
        let counter = ClutterCounter::default();
        counter.add("a", "12345678");
        counter.add("b", "1234");
        assert_eq!(counter.pending_tokens("a"), 2);
        counter.clear("a");
        assert_eq!(counter.pending_tokens("a"), 0);
        assert_eq!(counter.pending_tokens("b"), 1);
        assert_eq!(counter.add("a", ""), None);
    }
}
