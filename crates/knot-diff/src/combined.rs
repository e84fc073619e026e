//! N-way alignment of per-parent diffs against a shared post-image.
//!
//! Every parent diff targets the same `b` document, so after skipping each
//! parent's deletions they all advance through `b` at the same pace. Rows
//! that only delete from one parent are emitted before the lock-step row.

use std::fmt;

use crate::hunk::DiffRow;
use crate::myers::{Edit, EditKind, Line};

/// One synchronized row of a combined diff: one slot per parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub edits: Vec<Option<Edit>>,
}

impl Row {
    pub fn new(edits: Vec<Option<Edit>>) -> Self {
        Self { edits }
    }
}

impl DiffRow for Row {
    /// `Ins` if any parent inserts here, otherwise the first present kind.
    fn kind(&self) -> EditKind {
        let mut kinds = self.edits.iter().flatten().map(|e| e.kind);
        let first = kinds.next().unwrap_or(EditKind::Eql);
        if first == EditKind::Ins || kinds.any(|k| k == EditKind::Ins) {
            EditKind::Ins
        } else {
            first
        }
    }

    fn a_lines(&self) -> Vec<Option<&Line>> {
        self.edits
            .iter()
            .map(|e| e.as_ref().and_then(|e| e.a_line.as_ref()))
            .collect()
    }

    fn b_line(&self) -> Option<&Line> {
        self.edits
            .first()
            .and_then(|e| e.as_ref())
            .and_then(|e| e.b_line.as_ref())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for edit in &self.edits {
            let symbol = edit.as_ref().map(|e| e.kind.symbol()).unwrap_or(' ');
            write!(f, "{symbol}")?;
        }
        let deleted = self
            .edits
            .iter()
            .flatten()
            .find(|e| e.kind == EditKind::Del)
            .and_then(|e| e.a_line.as_ref());
        let text = deleted
            .or_else(|| self.b_line())
            .map(|line| line.text.as_str())
            .unwrap_or("");
        write!(f, "{text}")
    }
}

/// Aligns several diffs that share a post-image.
pub struct Combined {
    diffs: Vec<Vec<Edit>>,
    offsets: Vec<usize>,
}

impl Combined {
    pub fn new(diffs: Vec<Vec<Edit>>) -> Self {
        let offsets = vec![0; diffs.len()];
        Self { diffs, offsets }
    }

    pub fn rows(mut self) -> Vec<Row> {
        let mut rows = Vec::new();
        loop {
            for i in 0..self.diffs.len() {
                self.consume_deletions(i, &mut rows);
            }
            if self.complete() {
                return rows;
            }

            let edits = self
                .offsets
                .iter()
                .zip(&self.diffs)
                .map(|(&offset, diff)| diff.get(offset).cloned())
                .collect();
            for offset in &mut self.offsets {
                *offset += 1;
            }
            rows.push(Row::new(edits));
        }
    }

    fn consume_deletions(&mut self, i: usize, rows: &mut Vec<Row>) {
        let diff = &self.diffs[i];
        while let Some(edit) = diff.get(self.offsets[i]).filter(|e| e.kind == EditKind::Del) {
            let mut edits = vec![None; self.diffs.len()];
            edits[i] = Some(edit.clone());
            self.offsets[i] += 1;
            rows.push(Row::new(edits));
        }
    }

    fn complete(&self) -> bool {
        self.offsets
            .iter()
            .zip(&self.diffs)
            .all(|(&offset, diff)| offset >= diff.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{combined, combined_hunks};

    fn render(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn two_parents_merge_view() {
        let left = "alfa\nbravo\ndelta\n";
        let right = "alfa\ncharlie\ndelta\n";
        let merged = "alfa\nbravo\ncharlie\ndelta\n";

        let rows = combined(&[left, right], merged);
        assert_eq!(render(&rows), vec!["  alfa", " +bravo", "+ charlie", "  delta"]);
    }

    #[test]
    fn deletions_come_before_lockstep_rows() {
        let left = "a\nx\nb\n";
        let right = "a\nb\n";
        let merged = "a\nb\n";

        let rows = combined(&[left, right], merged);
        assert_eq!(render(&rows), vec!["  a", "- x", "  b"]);
        assert_eq!(rows[1].kind(), EditKind::Del);
        assert_eq!(rows[1].b_line(), None);
    }

    #[test]
    fn combined_hunk_header_has_one_range_per_parent() {
        let left = "alfa\nbravo\ndelta\n";
        let right = "alfa\ncharlie\ndelta\n";
        let merged = "alfa\nbravo\ncharlie\ndelta\n";

        let hunks = combined_hunks(&[left, right], merged);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].header(), "@@@ -1,3 -1,3 +1,4 @@@");
    }

    #[test]
    fn row_kind_prefers_insertion() {
        let ins = Edit::ins(Line::new(1, "x"));
        let eql = Edit::eql(Line::new(1, "y"), Line::new(1, "y"));
        assert_eq!(Row::new(vec![Some(eql.clone()), Some(ins)]).kind(), EditKind::Ins);
        assert_eq!(Row::new(vec![Some(eql.clone()), Some(eql)]).kind(), EditKind::Eql);
        assert_eq!(Row::new(vec![None, None]).kind(), EditKind::Eql);
    }
}
