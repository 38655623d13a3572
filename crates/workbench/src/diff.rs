//! Line diff used by the review surface.
//!
//! Common prefix and suffix are matched directly; the differing middle is
//! aligned with a longest-common-subsequence table. Inputs are bounded by
//! [`text_diff_with_limit`], which keeps the table small.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_DIFF_LINES: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Context,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    #[serde(rename = "type")]
    pub kind: LineKind,
    pub text: String,
    /// 1-based line in the old text; absent for added lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_line: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub lines: Vec<DiffLine>,
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

/// Number of lines as counted for the size cap.
pub fn line_count(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        text.matches('\n').count() + 1
    }
}

struct Builder {
    lines: Vec<DiffLine>,
    old_line: usize,
    new_line: usize,
}

impl Builder {
    fn context(&mut self, text: &str) {
        self.lines.push(DiffLine {
            kind: LineKind::Context,
            text: text.to_string(),
            old_line: Some(self.old_line),
            new_line: Some(self.new_line),
        });
        self.old_line += 1;
        self.new_line += 1;
    }

    fn removed(&mut self, text: &str) {
        self.lines.push(DiffLine {
            kind: LineKind::Removed,
            text: text.to_string(),
            old_line: Some(self.old_line),
            new_line: None,
        });
        self.old_line += 1;
    }

    fn added(&mut self, text: &str) {
        self.lines.push(DiffLine {
            kind: LineKind::Added,
            text: text.to_string(),
            old_line: None,
            new_line: Some(self.new_line),
        });
        self.new_line += 1;
    }
}

/// Full line diff of `before` against `after` as a single hunk.
pub fn text_diff(before: &str, after: &str) -> Vec<Hunk> {
    let a = split_lines(before);
    let b = split_lines(after);
    if a.is_empty() && b.is_empty() {
        return Vec::new();
    }

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];

    let mut out = Builder {
        lines: Vec::with_capacity(a.len().max(b.len())),
        old_line: 1,
        new_line: 1,
    };
    for line in &a[..prefix] {
        out.context(line);
    }
    align_middle(a_mid, b_mid, &mut out);
    for line in &a[a.len() - suffix..] {
        out.context(line);
    }

    vec![Hunk { lines: out.lines }]
}

fn align_middle(a: &[&str], b: &[&str], out: &mut Builder) {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    // lcs[i * width + j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            out.context(a[i]);
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            out.removed(a[i]);
            i += 1;
        } else {
            out.added(b[j]);
            j += 1;
        }
    }
    for line in &a[i..] {
        out.removed(line);
    }
    for line in &b[j..] {
        out.added(line);
    }
}

/// Diff with a cap on the combined line count.
///
/// Over the cap, only the leading lines of each side (half the cap each)
/// are diffed and the second value is `true`.
pub fn text_diff_with_limit(before: &str, after: &str, max_lines: usize) -> (Vec<Hunk>, bool) {
    let max_lines = if max_lines == 0 { DEFAULT_MAX_DIFF_LINES } else { max_lines };
    if line_count(before) + line_count(after) <= max_lines {
        return (text_diff(before, after), false);
    }
    let keep = (max_lines / 2).max(1);
    let head = |text: &str| -> String {
        split_lines(text).into_iter().take(keep).collect::<Vec<_>>().join("\n")
    };
    (text_diff(&head(before), &head(after)), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(hunks: &[Hunk]) -> Vec<(LineKind, &str)> {
        hunks[0].lines.iter().map(|l| (l.kind, l.text.as_str())).collect()
    }

    #[test]
    fn identical_text_is_all_context() {
        let hunks = text_diff("a\nb\n", "a\nb\n");
        assert!(hunks[0].lines.iter().all(|l| l.kind == LineKind::Context));
        assert_eq!(hunks[0].lines.len(), 2);
    }

    #[test]
    fn empty_before_is_all_added() {
        let hunks = text_diff("", "x\ny");
        assert_eq!(kinds(&hunks), vec![(LineKind::Added, "x"), (LineKind::Added, "y")]);
        assert_eq!(hunks[0].lines[1].new_line, Some(2));
        assert_eq!(hunks[0].lines[1].old_line, None);
    }

    #[test]
    fn both_empty_has_no_hunks() {
        assert!(text_diff("", "").is_empty());
    }

    #[test]
    fn changed_middle_line() {
        let hunks = text_diff("one\ntwo\nthree", "one\n2\nthree");
        assert_eq!(
            kinds(&hunks),
            vec![
                (LineKind::Context, "one"),
                (LineKind::Removed, "two"),
                (LineKind::Added, "2"),
                (LineKind::Context, "three"),
            ]
        );
        let last = hunks[0].lines.last().unwrap();
        assert_eq!((last.old_line, last.new_line), (Some(3), Some(3)));
    }

    #[test]
    fn interleaved_edits_keep_common_lines() {
        let hunks = text_diff("a\nb\nc\nd", "a\nc\nd\ne");
        let removed: Vec<_> = kinds(&hunks)
            .into_iter()
            .filter(|(k, _)| *k != LineKind::Context)
            .collect();
        assert_eq!(removed, vec![(LineKind::Removed, "b"), (LineKind::Added, "e")]);
    }

    #[test]
    fn limit_truncates_instead_of_dropping() {
        let before: String = (0..10).map(|i| format!("l{i}\n")).collect();
        let after: String = (0..10).map(|i| format!("m{i}\n")).collect();
        let (hunks, too_large) = text_diff_with_limit(&before, &after, 8);
        assert!(too_large);
        assert!(!hunks.is_empty());
        assert_eq!(hunks[0].lines.len(), 8);
    }

    #[test]
    fn within_limit_is_not_flagged() {
        let (hunks, too_large) = text_diff_with_limit("a", "b", 5000);
        assert!(!too_large);
        assert_eq!(hunks[0].lines.len(), 2);
    }

    #[test]
    fn serializes_line_type_field() {
        let hunks = text_diff("", "x");
        let json = serde_json::to_value(&hunks[0].lines[0]).unwrap();
        assert_eq!(json["type"], "added");
        assert!(json.get("old_line").is_none());
    }
}
