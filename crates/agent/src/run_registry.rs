//! At most one active run per workbench, with cancellation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use workshop_core::error::{Error, Result};
use workshop_core::message::next_message_id;

#[derive(Debug, Clone)]
struct RunHandle {
    run_id: String,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, RunHandle>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunHandle>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the workbench. The returned guard releases the slot and cancels
    /// the run's token when dropped, whichever way the run ends.
    pub fn begin(self: &Arc<Self>, workbench_id: &str) -> Result<RunGuard> {
        let mut runs = self.lock();
        if runs.contains_key(workbench_id) {
            return Err(Error::Validation("workshop run already in progress".into()));
        }
        let handle = RunHandle {
            run_id: next_message_id("run"),
            cancel: CancellationToken::new(),
        };
        runs.insert(workbench_id.to_string(), handle.clone());
        debug!(workbench_id, run_id = %handle.run_id, "Run started");
        Ok(RunGuard {
            registry: Arc::clone(self),
            workbench_id: workbench_id.to_string(),
            run_id: handle.run_id,
            cancel: handle.cancel,
        })
    }

    /// Release the slot if it still belongs to `run_id`, then cancel it.
    pub fn end(&self, workbench_id: &str, run_id: &str) {
        let removed = {
            let mut runs = self.lock();
            match runs.get(workbench_id) {
                Some(handle) if handle.run_id == run_id => runs.remove(workbench_id),
                _ => None,
            }
        };
        if let Some(handle) = removed {
            handle.cancel.cancel();
            debug!(workbench_id, run_id, "Run ended");
        }
    }

    /// Request cancellation of the active run. Returns whether one existed.
    pub fn cancel(&self, workbench_id: &str) -> bool {
        let handle = self.lock().get(workbench_id).cloned();
        match handle {
            Some(handle) => {
                handle.cancel.cancel();
                info!(workbench_id, run_id = %handle.run_id, "Run cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, workbench_id: &str) -> bool {
        self.lock().contains_key(workbench_id)
    }
}

/// Ownership of a workbench's run slot.
#[derive(Debug)]
pub struct RunGuard {
    registry: Arc<RunRegistry>,
    workbench_id: String,
    run_id: String,
    cancel: CancellationToken,
}

impl RunGuard {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.end(&self.workbench_id, &self.run_id);
    }
}
