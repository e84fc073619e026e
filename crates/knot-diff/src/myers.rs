//! Myers O(ND) shortest edit script.
//!
//! The forward pass records, for every edit distance `d`, the furthest
//! reaching `x` on each diagonal `k = x - y`. Backtracking walks those
//! frontiers from the end of both inputs to the start, so the edits come
//! out reversed and are flipped before returning.

use std::fmt;

/// One line of an input document with its 1-based line number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub text: String,
}

impl Line {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EditKind {
    Eql,
    Ins,
    Del,
}

impl EditKind {
    pub fn symbol(&self) -> char {
        match self {
            Self::Eql => ' ',
            Self::Ins => '+',
            Self::Del => '-',
        }
    }
}

/// A single step of an edit script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edit {
    pub kind: EditKind,
    pub a_line: Option<Line>,
    pub b_line: Option<Line>,
}

impl Edit {
    pub fn eql(a: Line, b: Line) -> Self {
        Self {
            kind: EditKind::Eql,
            a_line: Some(a),
            b_line: Some(b),
        }
    }

    pub fn ins(b: Line) -> Self {
        Self {
            kind: EditKind::Ins,
            a_line: None,
            b_line: Some(b),
        }
    }

    pub fn del(a: Line) -> Self {
        Self {
            kind: EditKind::Del,
            a_line: Some(a),
            b_line: None,
        }
    }

    /// Text of the line this edit shows.
    pub fn text(&self) -> &str {
        self.a_line
            .as_ref()
            .or(self.b_line.as_ref())
            .map(|line| line.text.as_str())
            .unwrap_or("")
    }
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.symbol(), self.text())
    }
}

pub struct Myers<'a> {
    a: &'a [Line],
    b: &'a [Line],
}

impl<'a> Myers<'a> {
    pub fn new(a: &'a [Line], b: &'a [Line]) -> Self {
        Self { a, b }
    }

    pub fn diff(&self) -> Vec<Edit> {
        let mut edits = Vec::new();
        self.backtrack(|prev_x, prev_y, x, y| {
            let edit = if x == prev_x {
                Edit::ins(self.b[prev_y].clone())
            } else if y == prev_y {
                Edit::del(self.a[prev_x].clone())
            } else {
                Edit::eql(self.a[prev_x].clone(), self.b[prev_y].clone())
            };
            edits.push(edit);
        });
        edits.reverse();
        edits
    }

    fn max(&self) -> isize {
        (self.a.len() + self.b.len()) as isize
    }

    fn index(&self, k: isize) -> usize {
        (k + self.max() + 1) as usize
    }

    // Moving down from k+1 is an insertion, moving right from k-1 a
    // deletion. Ties go to the deletion.
    fn go_down(&self, v: &[isize], k: isize, d: isize) -> bool {
        k == -d || (k != d && v[self.index(k - 1)] < v[self.index(k + 1)])
    }

    fn shortest_edit(&self) -> Vec<Vec<isize>> {
        let n = self.a.len() as isize;
        let m = self.b.len() as isize;
        let max = self.max();

        let mut v = vec![0isize; (2 * max + 3) as usize];
        let mut trace = Vec::new();

        for d in 0..=max {
            trace.push(v.clone());
            let mut k = -d;
            while k <= d {
                let mut x = if self.go_down(&v, k, d) {
                    v[self.index(k + 1)]
                } else {
                    v[self.index(k - 1)] + 1
                };
                let mut y = x - k;

                while x < n && y < m && self.a[x as usize].text == self.b[y as usize].text {
                    x += 1;
                    y += 1;
                }

                let slot = self.index(k);
                v[slot] = x;
                if x >= n && y >= m {
                    return trace;
                }
                k += 2;
            }
        }
        trace
    }

    fn backtrack<F>(&self, mut emit: F)
    where
        F: FnMut(usize, usize, usize, usize),
    {
        let mut x = self.a.len() as isize;
        let mut y = self.b.len() as isize;

        for (d, v) in self.shortest_edit().iter().enumerate().rev() {
            let d = d as isize;
            let k = x - y;
            let prev_k = if self.go_down(v, k, d) { k + 1 } else { k - 1 };
            let prev_x = v[self.index(prev_k)];
            let prev_y = prev_x - prev_k;

            while x > prev_x && y > prev_y {
                emit((x - 1) as usize, (y - 1) as usize, x as usize, y as usize);
                x -= 1;
                y -= 1;
            }
            if d > 0 {
                emit(prev_x as usize, prev_y as usize, x as usize, y as usize);
            }
            x = prev_x;
            y = prev_y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines;

    fn chars(s: &str) -> Vec<Line> {
        s.chars()
            .enumerate()
            .map(|(i, c)| Line::new(i + 1, c.to_string()))
            .collect()
    }

    fn render(edits: &[Edit]) -> String {
        edits.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(",")
    }

    #[test]
    fn classic_example_has_five_changes() {
        let a = chars("ABCABBA");
        let b = chars("CBABAC");
        let edits = Myers::new(&a, &b).diff();

        let changes = edits.iter().filter(|e| e.kind != EditKind::Eql).count();
        assert_eq!(changes, 5);
        assert_eq!(render(&edits), "-A,-B, C,+B, A, B,-B, A,+C");
    }

    #[test]
    fn identical_inputs_are_all_equal() {
        let a = lines("one\ntwo\n");
        let edits = Myers::new(&a, &a).diff();
        assert_eq!(edits.len(), 2);
        assert!(edits.iter().all(|e| e.kind == EditKind::Eql));
        assert_eq!(edits[1].a_line.as_ref().unwrap().number, 2);
    }

    #[test]
    fn empty_inputs() {
        let empty: Vec<Line> = Vec::new();
        assert!(Myers::new(&empty, &empty).diff().is_empty());

        let b = lines("x\ny\n");
        let edits = Myers::new(&empty, &b).diff();
        assert_eq!(render(&edits), "+x,+y");

        let edits = Myers::new(&b, &empty).diff();
        assert_eq!(render(&edits), "-x,-y");
    }

    #[test]
    fn replacement_prefers_deletion_first() {
        let a = lines("a\nold\nc\n");
        let b = lines("a\nnew\nc\n");
        assert_eq!(render(&Myers::new(&a, &b).diff()), " a,-old,+new, c");
    }
}
