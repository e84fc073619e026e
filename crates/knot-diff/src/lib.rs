//! Diff engine for knot.
//!
//! Computes line-level differences between texts and structural differences
//! between trees.
//!
//! # Key Types
//!
//! - [`Myers`] / [`Edit`]: shortest edit script between two line sequences
//! - [`Hunk`]: context-padded change regions with `@@` headers
//! - [`Combined`] / [`Row`]: N-way alignment for merge commits
//! - [`TreeDiff`] / [`PathFilter`]: path-level diff between two trees

pub mod combined;
pub mod error;
pub mod hunk;
pub mod myers;
pub mod tree_diff;

pub use combined::{Combined, Row};
pub use error::{DiffError, DiffResult};
pub use hunk::{DiffRow, Hunk, HUNK_CONTEXT};
pub use myers::{Edit, EditKind, Line, Myers};
pub use tree_diff::{
    combined_changes, tree_diff, ChangeKind, CombinedChange, PathFilter, TreeChanges, TreeDiff,
};

/// Split a document into numbered lines. A trailing newline does not
/// produce an empty last line.
pub fn lines(document: &str) -> Vec<Line> {
    if document.is_empty() {
        return Vec::new();
    }
    let mut texts: Vec<&str> = document.split('\n').collect();
    if document.ends_with('\n') {
        texts.pop();
    }
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Line::new(i + 1, text))
        .collect()
}

/// Edit script turning `a` into `b`.
pub fn diff(a: &[Line], b: &[Line]) -> Vec<Edit> {
    Myers::new(a, b).diff()
}

/// Edit script between two texts.
pub fn diff_lines(a: &str, b: &str) -> Vec<Edit> {
    diff(&lines(a), &lines(b))
}

pub fn diff_hunks(a: &str, b: &str) -> Vec<Hunk<Edit>> {
    Hunk::filter(&diff_lines(a, b))
}

/// Align the diffs of every parent text against `b`.
pub fn combined<S: AsRef<str>>(parents: &[S], b: &str) -> Vec<Row> {
    let b_lines = lines(b);
    let diffs = parents
        .iter()
        .map(|a| diff(&lines(a.as_ref()), &b_lines))
        .collect();
    Combined::new(diffs).rows()
}

pub fn combined_hunks<S: AsRef<str>>(parents: &[S], b: &str) -> Vec<Hunk<Row>> {
    Hunk::filter(&combined(parents, b))
}
