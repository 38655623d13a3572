//! Session-only egress consent: which providers the user has allowed to
//! receive a workbench's content during this process lifetime.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::info;

#[derive(Debug, Default)]
pub struct ConsentCache {
    granted: RwLock<HashMap<String, HashSet<String>>>,
}

impl ConsentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, workbench_id: &str, provider_id: &str) {
        let mut granted = self.granted.write().unwrap_or_else(|p| p.into_inner());
        granted
            .entry(workbench_id.to_string())
            .or_default()
            .insert(provider_id.to_string());
        info!(workbench_id, provider_id, "Session egress consent granted");
    }

    pub fn has(&self, workbench_id: &str, provider_id: &str) -> bool {
        self.granted
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(workbench_id)
            .is_some_and(|providers| providers.contains(provider_id))
    }

    pub fn revoke_all(&self, workbench_id: &str) {
        self.granted
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(workbench_id);
    }
}
