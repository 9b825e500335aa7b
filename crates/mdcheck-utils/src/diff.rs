//! Diff generation for before/after content comparisons.
//!
//! Produces both a unified diff and a line-by-line view. Counts follow the
//! unified output: `additions_count` is the number of `+` lines excluding
//! the `+++` header, `deletions_count` the `-` lines excluding `---`.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

/// One line of the side-by-side view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffLine {
    #[serde(rename = "type")]
    pub kind: DiffLineKind,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    Unchanged,
    Addition,
    Deletion,
}

/// A computed diff plus change statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffReport {
    pub unified_diff: String,
    pub side_by_side: Vec<DiffLine>,
    pub additions_count: usize,
    pub deletions_count: usize,
    pub modifications_count: usize,
    pub total_changes: usize,
}

/// Diff `original` against `enhanced` line by line.
pub fn generate(original: &str, enhanced: &str) -> DiffReport {
    let diff = TextDiff::from_lines(original, enhanced);

    let unified_diff = diff
        .unified_diff()
        .context_radius(3)
        .header("original", "enhanced")
        .to_string();

    let mut side_by_side = Vec::new();
    let mut additions = 0usize;
    let mut deletions = 0usize;

    for change in diff.iter_all_changes() {
        let content = change.value().trim_end_matches(['\r', '\n']).to_string();
        let kind = match change.tag() {
            ChangeTag::Equal => DiffLineKind::Unchanged,
            ChangeTag::Insert => {
                additions += 1;
                DiffLineKind::Addition
            }
            ChangeTag::Delete => {
                deletions += 1;
                DiffLineKind::Deletion
            }
        };
        side_by_side.push(DiffLine { kind, content });
    }

    DiffReport {
        unified_diff,
        side_by_side,
        additions_count: additions,
        deletions_count: deletions,
        modifications_count: additions.min(deletions),
        total_changes: additions + deletions,
    }
}
