//! Sliding-window detection of repeated tool calls.

use std::collections::{HashMap, VecDeque};

use workshop_config::LoopDetectionConfig;
use workshop_core::message::ToolCall;

use crate::fingerprint::tool_call_hash;

/// What to do with the call that was just observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVerdict {
    Proceed,
    /// Repeated often enough to warn about; the call still runs.
    Warn,
    /// Repeated too often; the call must not run and the phase ends.
    Stop,
}

/// Tracks the fingerprints of the most recent tool calls in one phase run.
#[derive(Debug)]
pub struct LoopDetector {
    window: usize,
    warn_threshold: usize,
    stop_threshold: usize,
    recent: VecDeque<String>,
}

impl LoopDetector {
    pub fn new(config: &LoopDetectionConfig) -> Self {
        Self {
            window: config.window.max(1),
            warn_threshold: config.warn_threshold,
            stop_threshold: config.stop_threshold,
            recent: VecDeque::with_capacity(config.window),
        }
    }

    pub fn stop_threshold(&self) -> usize {
        self.stop_threshold
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Record `call` and judge the window including it.
    pub fn observe(&mut self, call: &ToolCall) -> LoopVerdict {
        self.recent.push_back(tool_call_hash(call));
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for hash in &self.recent {
            *counts.entry(hash.as_str()).or_default() += 1;
        }
        let max = counts.values().copied().max().unwrap_or_default();
        if max >= self.stop_threshold {
            LoopVerdict::Stop
        } else if max >= self.warn_threshold {
            LoopVerdict::Warn
        } else {
            LoopVerdict::Proceed
        }
    }
}
