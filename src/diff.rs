//! Line-level alignment between an original and a proposed text
//!
//! Builds the classic longest-common-subsequence table over exact line
//! equality and backtracks it into an edit script. No whitespace or line
//! ending normalization happens here: `"a"` and `"a\r"` are different lines.
//!
//! Time and memory are O(m·n). [`diff_text`] refuses inputs whose table would
//! exceed [`DEFAULT_MAX_DIFF_CELLS`]; [`align`] itself does no checking.

use thiserror::Error;

/// Table cells [`diff_text`] is willing to fill, about 128 MB of `usize`
pub const DEFAULT_MAX_DIFF_CELLS: usize = 16_000_000;

/// The texts have too many lines to align within the cell budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("too large to diff ({original_lines} x {proposed_lines} lines)")]
pub struct DiffTooLarge {
    pub original_lines: usize,
    pub proposed_lines: usize,
}

/// A single step in an edit script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Line present in both texts
    Equal(String),
    /// Line only present in the original
    Delete(String),
    /// Line only present in the proposal
    Insert(String),
}

impl EditOp {
    pub fn line(&self) -> &str {
        match self {
            EditOp::Equal(s) | EditOp::Delete(s) | EditOp::Insert(s) => s,
        }
    }
}

/// Split text into lines on `'\n'` only.
///
/// A trailing newline produces a trailing empty line, so `"a\n"` and `"a"`
/// differ by one line.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Align two line sequences into an edit script.
///
/// On a mismatch the backtrack steps toward the neighbor with the longer
/// subsequence; ties delete the original line first. Reading the result left
/// to right, dropping `Insert` gives `original` and dropping `Delete` gives
/// `proposed`.
pub fn align<A, B>(original: &[A], proposed: &[B]) -> Vec<EditOp>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let m = original.len();
    let n = proposed.len();
    let width = n + 1;

    // table[i * width + j] = LCS length of original[..i] and proposed[..j]
    let mut table = vec![0usize; (m + 1) * width];
    for i in 1..=m {
        for j in 1..=n {
            table[i * width + j] = if original[i - 1].as_ref() == proposed[j - 1].as_ref() {
                table[(i - 1) * width + (j - 1)] + 1
            } else {
                table[(i - 1) * width + j].max(table[i * width + (j - 1)])
            };
        }
    }

    let mut ops = Vec::with_capacity(m + n);
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        let a = original[i - 1].as_ref();
        let b = proposed[j - 1].as_ref();
        if a == b {
            ops.push(EditOp::Equal(a.to_string()));
            i -= 1;
            j -= 1;
        } else if table[(i - 1) * width + j] >= table[i * width + (j - 1)] {
            ops.push(EditOp::Delete(a.to_string()));
            i -= 1;
        } else {
            ops.push(EditOp::Insert(b.to_string()));
            j -= 1;
        }
    }
    while i > 0 {
        ops.push(EditOp::Delete(original[i - 1].as_ref().to_string()));
        i -= 1;
    }
    while j > 0 {
        ops.push(EditOp::Insert(proposed[j - 1].as_ref().to_string()));
        j -= 1;
    }

    ops.reverse();
    ops
}

/// Cells of the alignment table for `m` by `n` lines, `None` on overflow.
pub fn table_cells(m: usize, n: usize) -> Option<usize> {
    m.checked_add(1)?.checked_mul(n.checked_add(1)?)
}

/// Fail when aligning `m` by `n` lines would need more than `max_cells`.
pub fn check_size(m: usize, n: usize, max_cells: usize) -> Result<(), DiffTooLarge> {
    match table_cells(m, n) {
        Some(cells) if cells <= max_cells => Ok(()),
        _ => Err(DiffTooLarge {
            original_lines: m,
            proposed_lines: n,
        }),
    }
}

/// Split both texts into lines and align them within [`DEFAULT_MAX_DIFF_CELLS`].
pub fn diff_text(original: &str, proposed: &str) -> Result<Vec<EditOp>, DiffTooLarge> {
    diff_text_within(original, proposed, DEFAULT_MAX_DIFF_CELLS)
}

pub fn diff_text_within(
    original: &str,
    proposed: &str,
    max_cells: usize,
) -> Result<Vec<EditOp>, DiffTooLarge> {
    let a = split_lines(original);
    let b = split_lines(proposed);
    check_size(a.len(), b.len(), max_cells)?;
    Ok(align(&a, &b))
}

/// Lines of the original side of an edit script, in order.
pub fn original_lines(ops: &[EditOp]) -> Vec<&str> {
    ops.iter()
        .filter(|op| !matches!(op, EditOp::Insert(_)))
        .map(EditOp::line)
        .collect()
}

/// Lines of the proposed side of an edit script, in order.
pub fn proposed_lines(ops: &[EditOp]) -> Vec<&str> {
    ops.iter()
        .filter(|op| !matches!(op, EditOp::Delete(_)))
        .map(EditOp::line)
        .collect()
}

/// Line counts of an edit script
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl DiffStats {
    pub fn from_ops(ops: &[EditOp]) -> Self {
        ops.iter().fold(Self::default(), |mut acc, op| {
            match op {
                EditOp::Equal(_) => acc.unchanged += 1,
                EditOp::Delete(_) => acc.removed += 1,
                EditOp::Insert(_) => acc.added += 1,
            }
            acc
        })
    }

    /// True when the script contains no insertions or deletions
    pub fn is_identical(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_replays(a: &[&str], b: &[&str]) {
        let ops = align(a, b);
        assert_eq!(original_lines(&ops), a, "original side for {:?} -> {:?}", a, b);
        assert_eq!(proposed_lines(&ops), b, "proposed side for {:?} -> {:?}", a, b);
    }

    #[test]
    fn test_replay_reconstructs_both_sides() {
        let cases: &[(&[&str], &[&str])] = &[
            (&["a", "b", "c"], &["a", "c"]),
            (&["a", "c"], &["a", "b", "c"]),
            (&["fn main() {", "    old();", "}"], &["fn main() {", "    new();", "    extra();", "}"]),
            (&["x", "y", "z"], &["z", "y", "x"]),
            (&["", "", "a"], &["a", "", ""]),
            (&["same"], &["same "]),
            (&["a\r", "b"], &["a", "b"]),
        ];
        for (a, b) in cases {
            assert_replays(a, b);
        }
    }

    #[test]
    fn test_identical_sequences_are_all_equal() {
        let lines = ["use std::io;", "", "fn main() {}", ""];
        let ops = align(&lines, &lines);
        assert_eq!(ops.len(), lines.len());
        assert!(ops.iter().all(|op| matches!(op, EditOp::Equal(_))));
    }

    #[test]
    fn test_empty_original_is_all_inserts() {
        let empty: [&str; 0] = [];
        let ops = align(&empty, &["one", "two", "three"]);
        assert_eq!(
            ops,
            vec![
                EditOp::Insert("one".into()),
                EditOp::Insert("two".into()),
                EditOp::Insert("three".into()),
            ]
        );
    }

    #[test]
    fn test_empty_proposal_is_all_deletes() {
        let empty: [&str; 0] = [];
        let ops = align(&["one", "two"], &empty);
        assert_eq!(
            ops,
            vec![EditOp::Delete("one".into()), EditOp::Delete("two".into())]
        );
    }

    #[test]
    fn test_both_empty() {
        let empty: [&str; 0] = [];
        assert!(align(&empty, &empty).is_empty());
    }

    #[test]
    fn test_tie_break_prefers_deleting_original_line() {
        // Both orderings are minimal; the backtrack must delete "b" at the end.
        let ops = align(&["a", "b"], &["b", "a"]);
        assert_eq!(
            ops,
            vec![
                EditOp::Insert("b".into()),
                EditOp::Equal("a".into()),
                EditOp::Delete("b".into()),
            ]
        );
    }

    #[test]
    fn test_disjoint_sequences() {
        let ops = align(&["x1", "x2"], &["y1", "y2"]);
        assert_eq!(
            ops,
            vec![
                EditOp::Insert("y1".into()),
                EditOp::Insert("y2".into()),
                EditOp::Delete("x1".into()),
                EditOp::Delete("x2".into()),
            ]
        );
    }

    #[test]
    fn test_single_line_change_in_middle() {
        // The backtrack runs from the end, so the deletion lands after the insertion.
        let ops = diff_text("a\nb\nc", "a\nB\nc").unwrap();
        assert_eq!(
            ops,
            vec![
                EditOp::Equal("a".into()),
                EditOp::Insert("B".into()),
                EditOp::Delete("b".into()),
                EditOp::Equal("c".into()),
            ]
        );
    }

    #[test]
    fn test_trailing_newline_is_a_line() {
        let ops = diff_text("a", "a\n").unwrap();
        assert_eq!(ops, vec![EditOp::Equal("a".into()), EditOp::Insert(String::new())]);
    }

    #[test]
    fn test_script_is_minimal() {
        let a = ["a", "b", "c", "d", "e"];
        let b = ["a", "c", "d", "x", "e"];
        let stats = DiffStats::from_ops(&align(&a, &b));
        // LCS is a,c,d,e
        assert_eq!(stats, DiffStats { added: 1, removed: 1, unchanged: 4 });
    }

    #[test]
    fn test_stats_identical() {
        let ops = diff_text("same\ntext", "same\ntext").unwrap();
        assert!(DiffStats::from_ops(&ops).is_identical());
        assert!(!DiffStats::from_ops(&diff_text("a", "b").unwrap()).is_identical());
    }

    #[test]
    fn test_oversized_input_is_refused() {
        let big = "a\n".repeat(5_000);
        let other = "b\n".repeat(5_000);
        let err = diff_text(&big, &other).unwrap_err();
        assert_eq!(
            err,
            DiffTooLarge {
                original_lines: 5_001,
                proposed_lines: 5_001,
            }
        );
        assert!(err.to_string().starts_with("too large to diff"));
    }

    #[test]
    fn test_cell_budget_is_inclusive() {
        // 2 lines each -> 3 x 3 table
        assert!(diff_text_within("a\nb", "a\nc", 9).is_ok());
        assert!(diff_text_within("a\nb", "a\nc", 8).is_err());
    }

    #[test]
    fn test_table_cells_overflow() {
        assert_eq!(table_cells(2, 3), Some(12));
        assert_eq!(table_cells(usize::MAX, 0), None);
        assert!(check_size(usize::MAX / 2, 4, usize::MAX).is_err());
    }
}
