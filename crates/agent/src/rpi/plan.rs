//! The execution plan produced by the plan phase.
//!
//! The plan is kept as the model wrote it, with every checklist line lifted
//! into a typed [`PlanItem`]. Item status lives in the item, not in the
//! line text; the markdown form is regenerated on render.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::LazyLock;

static ITEM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- \[([ x!])\]\s*(\d+)\.\s*(.+)$").expect("valid pattern")
});
static UNCHECKED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- \[ \]\s*\d+\.\s*.+$").expect("valid pattern")
});
static ORIGINAL_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*original_count:\s*(\d+)\s*-->")
        .expect("valid pattern")
});
static FAILED_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+\[Failed:\s*(.*)\]\s*$").expect("valid pattern")
});

/// Longest failure reason kept on a plan item.
pub const MAX_FAILURE_REASON_CHARS: usize = 220;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PlanItemStatus {
    Pending,
    Done,
    Failed(String),
}

impl PlanItemStatus {
    fn marker(&self) -> char {
        match self {
            PlanItemStatus::Pending => ' ',
            PlanItemStatus::Done => 'x',
            PlanItemStatus::Failed(_) => '!',
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PlanItemStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    /// The number the plan gave this item.
    pub index: u32,
    pub label: String,
    pub status: PlanItemStatus,
}

impl PlanItem {
    /// The checklist line, e.g. `- [!] 2. Add totals [Failed: timeout]`.
    pub fn render(&self) -> String {
        let mut line = format!("- [{}] {}. {}", self.status.marker(), self.index, self.label);
        if let PlanItemStatus::Failed(reason) = &self.status {
            if !reason.is_empty() {
                let _ = write!(line, " [Failed: {reason}]");
            }
        }
        line
    }

    fn parse(line: &str) -> Option<Self> {
        let caps = ITEM_LINE.captures(line)?;
        let index = caps[2].parse().ok()?;
        let rest = caps[3].trim();
        let (label, failure) = match FAILED_SUFFIX.captures(rest) {
            Some(failed) => (
                rest[..failed.get(0).map_or(rest.len(), |m| m.start())].trim(),
                Some(failed[1].trim().to_string()),
            ),
            None => (rest, None),
        };
        let status = match &caps[1] {
            "x" => PlanItemStatus::Done,
            "!" => PlanItemStatus::Failed(failure.unwrap_or_default()),
            _ => PlanItemStatus::Pending,
        };
        Some(Self {
            index,
            label: label.to_string(),
            status,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanLine {
    Text(String),
    Item(PlanItem),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Number of checklist items the plan phase produced. Growth during
    /// implementation is capped relative to it.
    pub original_count: usize,
    pub lines: Vec<PlanLine>,
}

/// Outcome of [`Plan::append_items`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub appended: usize,
    pub dropped: usize,
}

impl Plan {
    /// Parse plan markdown. Returns `None` when it holds no checklist item.
    ///
    /// An `original_count` marker is honored; otherwise the item count is
    /// taken as the original count.
    pub fn parse(markdown: &str) -> Option<Self> {
        let mut lines = Vec::new();
        let mut marked_count = None;
        for raw in markdown.lines() {
            let line = raw.trim_end_matches('\r');
            if let Some(caps) = ORIGINAL_COUNT.captures(line) {
                marked_count = caps[1].parse::<usize>().ok().filter(|n| *n > 0);
                if line.trim() == &caps[0] {
                    continue;
                }
            }
            match PlanItem::parse(line.trim()) {
                Some(item) => lines.push(PlanLine::Item(item)),
                None => lines.push(PlanLine::Text(line.to_string())),
            }
        }
        let mut plan = Self {
            original_count: 0,
            lines,
        };
        let count = plan.items().count();
        if count == 0 {
            return None;
        }
        plan.original_count = marked_count.unwrap_or(count);
        Some(plan)
    }

    /// Markdown form with the `original_count` marker on the first line.
    pub fn render(&self) -> String {
        let mut out = format!("<!-- original_count: {} -->\n", self.original_count);
        for line in &self.lines {
            match line {
                PlanLine::Text(text) => out.push_str(text),
                PlanLine::Item(item) => out.push_str(&item.render()),
            }
            out.push('\n');
        }
        out
    }

    pub fn items(&self) -> impl Iterator<Item = &PlanItem> {
        self.lines.iter().filter_map(|line| match line {
            PlanLine::Item(item) => Some(item),
            PlanLine::Text(_) => None,
        })
    }

    pub fn item_count(&self) -> usize {
        self.items().count()
    }

    /// Position (0-based, among items) and item of the first pending item.
    pub fn next_pending(&self) -> Option<(usize, &PlanItem)> {
        self.items().enumerate().find(|(_, item)| item.status.is_pending())
    }

    pub fn all_done(&self) -> bool {
        self.items().all(|item| !item.status.is_pending())
    }

    /// Set the status of the item at `position`. Returns false when there is
    /// no such item.
    pub fn mark(&mut self, position: usize, status: PlanItemStatus) -> bool {
        let item = self
            .lines
            .iter_mut()
            .filter_map(|line| match line {
                PlanLine::Item(item) => Some(item),
                PlanLine::Text(_) => None,
            })
            .nth(position);
        match item {
            Some(item) => {
                item.status = match status {
                    PlanItemStatus::Failed(reason) => PlanItemStatus::Failed(compact_reason(&reason)),
                    other => other,
                };
                true
            }
            None => false,
        }
    }

    /// Append unchecked items after the last existing item, keeping the total
    /// at or below `inflation * original_count`. Items past the cap are
    /// dropped whole.
    pub fn append_items(&mut self, new_lines: &[String], inflation: usize) -> AppendOutcome {
        let items: Vec<PlanItem> = new_lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| UNCHECKED_LINE.is_match(line))
            .filter_map(PlanItem::parse)
            .collect();
        let current = self.item_count();
        let max = self.original_count.saturating_mul(inflation);
        let allowed = if max == 0 {
            items.len()
        } else {
            max.saturating_sub(current).min(items.len())
        };
        let dropped = items.len() - allowed;

        let insert_at = self
            .lines
            .iter()
            .rposition(|line| matches!(line, PlanLine::Item(_)))
            .map_or(self.lines.len(), |pos| pos + 1);
        self.lines.splice(
            insert_at..insert_at,
            items.into_iter().take(allowed).map(PlanLine::Item),
        );
        AppendOutcome {
            appended: allowed,
            dropped,
        }
    }
}

/// Unchecked checklist lines found in free text, trimmed.
pub fn extract_new_items(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| UNCHECKED_LINE.is_match(line))
        .map(str::to_string)
        .collect()
}

/// Single-line failure reason, cut to [`MAX_FAILURE_REASON_CHARS`].
pub fn compact_reason(reason: &str) -> String {
    let flat = reason.replace(['\r', '\n'], " ");
    let flat = flat.trim();
    match flat.char_indices().nth(MAX_FAILURE_REASON_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat.to_string(),
    }
}
