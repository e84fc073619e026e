use std::fmt;

use crate::myers::{Edit, EditKind, Line};

/// Lines of unchanged context kept around each change.
pub const HUNK_CONTEXT: usize = 3;

/// A row of a line diff, either a two-way [`Edit`] or an N-way
/// combined [`Row`](crate::combined::Row).
pub trait DiffRow: Clone {
    fn kind(&self) -> EditKind;

    /// The pre-image line for each parent (one entry for a two-way diff).
    fn a_lines(&self) -> Vec<Option<&Line>>;

    /// The post-image line.
    fn b_line(&self) -> Option<&Line>;
}

impl DiffRow for Edit {
    fn kind(&self) -> EditKind {
        self.kind
    }

    fn a_lines(&self) -> Vec<Option<&Line>> {
        vec![self.a_line.as_ref()]
    }

    fn b_line(&self) -> Option<&Line> {
        self.b_line.as_ref()
    }
}

/// A contiguous, context-padded region of changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk<E> {
    a_starts: Vec<usize>,
    b_start: Option<usize>,
    pub edits: Vec<E>,
}

impl<E: DiffRow> Hunk<E> {
    fn new(a_starts: Vec<usize>, b_start: Option<usize>) -> Self {
        Self {
            a_starts,
            b_start,
            edits: Vec::new(),
        }
    }

    /// Group an edit script into hunks.
    ///
    /// Changes separated by fewer than `2 * HUNK_CONTEXT + 1` unchanged
    /// lines share a hunk.
    pub fn filter(edits: &[E]) -> Vec<Self> {
        let mut hunks = Vec::new();
        let mut offset: isize = 0;
        let len = edits.len() as isize;

        loop {
            while offset < len && edits[offset as usize].kind() == EditKind::Eql {
                offset += 1;
            }
            if offset >= len {
                return hunks;
            }

            offset -= HUNK_CONTEXT as isize + 1;
            let (a_starts, b_start) = if offset < 0 {
                (Vec::new(), None)
            } else {
                let edit = &edits[offset as usize];
                let a_starts = edit
                    .a_lines()
                    .iter()
                    .map(|line| line.map(|l| l.number).unwrap_or(0))
                    .collect();
                (a_starts, edit.b_line().map(|l| l.number))
            };

            let mut hunk = Hunk::new(a_starts, b_start);
            offset = hunk.build(edits, offset);
            hunks.push(hunk);
        }
    }

    fn build(&mut self, edits: &[E], mut offset: isize) -> isize {
        let len = edits.len() as isize;
        let mut counter: isize = -1;

        while counter != 0 {
            if offset >= 0 && counter > 0 {
                self.edits.push(edits[offset as usize].clone());
            }
            offset += 1;
            if offset >= len {
                break;
            }
            match edits.get((offset as usize) + HUNK_CONTEXT) {
                Some(edit) if edit.kind() != EditKind::Eql => {
                    counter = 2 * HUNK_CONTEXT as isize + 1;
                }
                _ => counter -= 1,
            }
        }
        offset
    }

    /// `@@ -a,n +b,m @@`, or `@@@ -a,n -b,n +c,m @@@` for a two-parent
    /// combined hunk.
    pub fn header(&self) -> String {
        let columns = self.edits.first().map(|e| e.a_lines().len()).unwrap_or(1);

        let mut offsets: Vec<String> = (0..columns)
            .map(|i| {
                let lines: Vec<&Line> = self
                    .edits
                    .iter()
                    .filter_map(|e| e.a_lines().get(i).copied().flatten())
                    .collect();
                format_range('-', &lines, self.a_starts.get(i).copied())
            })
            .collect();

        let b_lines: Vec<&Line> = self.edits.iter().filter_map(|e| e.b_line()).collect();
        offsets.push(format_range('+', &b_lines, self.b_start));

        let sep = "@".repeat(offsets.len());
        format!("{sep} {} {sep}", offsets.join(" "))
    }
}

impl<E: DiffRow + fmt::Display> fmt::Display for Hunk<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header())?;
        for edit in &self.edits {
            writeln!(f, "{edit}")?;
        }
        Ok(())
    }
}

fn format_range(sign: char, lines: &[&Line], start: Option<usize>) -> String {
    let start = lines
        .first()
        .map(|line| line.number)
        .or(start)
        .unwrap_or(0);
    format!("{sign}{start},{}", lines.len())
}
