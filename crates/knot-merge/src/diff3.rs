//! Three-way line merge.
//!
//! Each side is diffed against the base and only the matching lines are
//! kept, as a map from base line number to side line number. The three
//! texts are then walked together: runs where both sides still match the
//! base are stable, and the stretch up to the next line matched on all
//! three is a chunk to resolve. A chunk is clean when one side left it
//! alone or both sides agree; otherwise it is a conflict.

use std::collections::HashMap;
use std::fmt;

use knot_diff::{diff, lines, EditKind, Line};

/// One resolved or unresolved stretch of the merged text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    Clean(Vec<String>),
    Conflict {
        o_lines: Vec<String>,
        a_lines: Vec<String>,
        b_lines: Vec<String>,
    },
}

impl Chunk {
    fn write_to(&self, out: &mut String, a_name: Option<&str>, b_name: Option<&str>) {
        match self {
            Chunk::Clean(lines) => {
                for line in lines {
                    out.push_str(line);
                    out.push('\n');
                }
            }
            Chunk::Conflict {
                a_lines, b_lines, ..
            } => {
                separator(out, '<', a_name);
                for line in a_lines {
                    out.push_str(line);
                    out.push('\n');
                }
                separator(out, '=', None);
                for line in b_lines {
                    out.push_str(line);
                    out.push('\n');
                }
                separator(out, '>', b_name);
            }
        }
    }
}

fn separator(out: &mut String, marker: char, name: Option<&str>) {
    out.extend(std::iter::repeat(marker).take(7));
    if let Some(name) = name {
        out.push(' ');
        out.push_str(name);
    }
    out.push('\n');
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diff3Result {
    pub chunks: Vec<Chunk>,
}

impl Diff3Result {
    /// No chunk needed manual resolution.
    pub fn clean(&self) -> bool {
        !self
            .chunks
            .iter()
            .any(|chunk| matches!(chunk, Chunk::Conflict { .. }))
    }

    /// The merged text, with conflicts delimited by `<<<<<<<`, `=======`
    /// and `>>>>>>>` markers labelled with the side names.
    pub fn to_text(&self, a_name: Option<&str>, b_name: Option<&str>) -> String {
        let mut out = String::new();
        for chunk in &self.chunks {
            chunk.write_to(&mut out, a_name, b_name);
        }
        out
    }
}

impl fmt::Display for Diff3Result {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(None, None))
    }
}

/// Merge `a` and `b`, both derived from `o`.
pub fn merge(o: &str, a: &str, b: &str) -> Diff3Result {
    Diff3::new(lines(o), lines(a), lines(b)).merge()
}

struct Diff3 {
    o: Vec<String>,
    a: Vec<String>,
    b: Vec<String>,
    match_a: HashMap<usize, usize>,
    match_b: HashMap<usize, usize>,
    line_o: usize,
    line_a: usize,
    line_b: usize,
    chunks: Vec<Chunk>,
}

impl Diff3 {
    fn new(o: Vec<Line>, a: Vec<Line>, b: Vec<Line>) -> Self {
        let match_a = match_set(&o, &a);
        let match_b = match_set(&o, &b);
        let text = |ls: Vec<Line>| -> Vec<String> { ls.into_iter().map(|l| l.text).collect() };
        Self {
            o: text(o),
            a: text(a),
            b: text(b),
            match_a,
            match_b,
            line_o: 0,
            line_a: 0,
            line_b: 0,
            chunks: Vec::new(),
        }
    }

    fn merge(mut self) -> Diff3Result {
        self.generate_chunks();
        Diff3Result {
            chunks: self.chunks,
        }
    }

    fn generate_chunks(&mut self) {
        loop {
            match self.find_next_mismatch() {
                Some(1) => match self.find_next_match() {
                    (o, Some(a), Some(b)) => self.emit_chunk(o, a, b),
                    _ => {
                        self.emit_final_chunk();
                        return;
                    }
                },
                Some(i) => self.emit_chunk(self.line_o + i, self.line_a + i, self.line_b + i),
                None => {
                    self.emit_final_chunk();
                    return;
                }
            }
        }
    }

    /// Offset of the first line past the current position where either side
    /// stops following the base, or `None` when all three are exhausted.
    fn find_next_mismatch(&self) -> Option<usize> {
        let mut i = 1;
        while self.in_bounds(i)
            && matches_at(&self.match_a, self.line_o, self.line_a, i)
            && matches_at(&self.match_b, self.line_o, self.line_b, i)
        {
            i += 1;
        }
        self.in_bounds(i).then_some(i)
    }

    fn in_bounds(&self, i: usize) -> bool {
        self.line_o + i <= self.o.len()
            || self.line_a + i <= self.a.len()
            || self.line_b + i <= self.b.len()
    }

    /// Next base line matched on both sides, with its side line numbers.
    fn find_next_match(&self) -> (usize, Option<usize>, Option<usize>) {
        let mut o = self.line_o + 1;
        while o < self.o.len() && !(self.match_a.contains_key(&o) && self.match_b.contains_key(&o)) {
            o += 1;
        }
        (o, self.match_a.get(&o).copied(), self.match_b.get(&o).copied())
    }

    /// Emit everything before the given 1-based line numbers.
    fn emit_chunk(&mut self, o: usize, a: usize, b: usize) {
        let chunk = resolve_chunk(
            &self.o[self.line_o..o - 1],
            &self.a[self.line_a..a - 1],
            &self.b[self.line_b..b - 1],
        );
        self.chunks.push(chunk);
        self.line_o = o - 1;
        self.line_a = a - 1;
        self.line_b = b - 1;
    }

    fn emit_final_chunk(&mut self) {
        let chunk = resolve_chunk(
            &self.o[self.line_o..],
            &self.a[self.line_a..],
            &self.b[self.line_b..],
        );
        self.chunks.push(chunk);
    }
}

/// Base line number to side line number, for lines the diff keeps.
fn match_set(o: &[Line], side: &[Line]) -> HashMap<usize, usize> {
    diff(o, side)
        .into_iter()
        .filter(|edit| edit.kind == EditKind::Eql)
        .filter_map(|edit| Some((edit.a_line?.number, edit.b_line?.number)))
        .collect()
}

fn matches_at(matches: &HashMap<usize, usize>, line_o: usize, offset: usize, i: usize) -> bool {
    matches.get(&(line_o + i)) == Some(&(offset + i))
}

fn resolve_chunk(o: &[String], a: &[String], b: &[String]) -> Chunk {
    if a == o || a == b {
        Chunk::Clean(b.to_vec())
    } else if b == o {
        Chunk::Clean(a.to_vec())
    } else {
        Chunk::Conflict {
            o_lines: o.to_vec(),
            a_lines: a.to_vec(),
            b_lines: b.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -----------------------------------------------------------------
    // Chunking
    // -----------------------------------------------------------------

    #[test]
    fn identical_inputs_are_one_clean_chunk() {
        let text = "one\ntwo\nthree\n";
        let result = merge(text, text, text);
        assert!(result.clean());
        assert_eq!(result.to_text(None, None), text);
    }

    #[test]
    fn overlapping_moves_conflict_twice() {
        let o = "celery\ngarlic\nonions\nsalmon\ntomatoes\nwine\n";
        let a = "celery\nsalmon\ntomatoes\ngarlic\nonions\nwine\n";
        let b = "celery\ngarlic\nsalmon\ntomatoes\nonions\nwine\n";
        let result = merge(o, a, b);
        assert!(!result.clean());
        assert_eq!(
            result.to_text(Some("left"), Some("right")),
            "celery\n\
             <<<<<<< left\n=======\ngarlic\n>>>>>>> right\n\
             salmon\ntomatoes\n\
             <<<<<<< left\ngarlic\nonions\n=======\nonions\n>>>>>>> right\n\
             wine\n"
        );
    }

    #[test]
    fn changes_in_different_places_are_clean() {
        let o = "1\n2\n3\n4\n5\n";
        let a = "one\n2\n3\n4\n5\n";
        let b = "1\n2\n3\n4\nfive\n";
        let result = merge(o, a, b);
        assert!(result.clean());
        assert_eq!(result.to_text(None, None), "one\n2\n3\n4\nfive\n");
    }

    #[test]
    fn same_change_on_both_sides_is_clean() {
        let result = merge("a\nb\nc\n", "a\nX\nc\n", "a\nX\nc\n");
        assert!(result.clean());
        assert_eq!(result.to_string(), "a\nX\nc\n");
    }

    #[test]
    fn conflicting_change_is_marked() {
        let result = merge("1\n", "two\n", "three\n");
        assert!(!result.clean());
        assert_eq!(
            result.chunks,
            vec![Chunk::Conflict {
                o_lines: vec!["1".into()],
                a_lines: vec!["two".into()],
                b_lines: vec!["three".into()],
            }]
        );
        assert_eq!(
            result.to_text(Some("master"), Some("topic")),
            "<<<<<<< master\ntwo\n=======\nthree\n>>>>>>> topic\n"
        );
    }

    #[test]
    fn conflict_keeps_surrounding_context_clean() {
        let o = "a\nb\nc\n";
        let result = merge(o, "a\nleft\nc\n", "a\nright\nc\n");
        assert_eq!(
            result.to_text(None, None),
            "a\n<<<<<<<\nleft\n=======\nright\n>>>>>>>\nc\n"
        );
    }

    #[test]
    fn empty_base_with_two_additions_conflicts() {
        let result = merge("", "mine\n", "theirs\n");
        assert!(!result.clean());
        let result = merge("", "same\n", "same\n");
        assert!(result.clean());
        assert_eq!(result.to_string(), "same\n");
    }

    // -----------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------

    fn text() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d", "e"]), 0..12)
            .prop_map(|ls| ls.iter().map(|l| format!("{l}\n")).collect())
    }

    proptest! {
        #[test]
        fn unchanged_left_takes_right(o in text(), b in text()) {
            let result = merge(&o, &o, &b);
            prop_assert!(result.clean());
            prop_assert_eq!(result.to_text(None, None), b);
        }

        #[test]
        fn unchanged_right_takes_left(o in text(), a in text()) {
            let result = merge(&o, &a, &o);
            prop_assert!(result.clean());
            prop_assert_eq!(result.to_text(None, None), a);
        }

        #[test]
        fn agreeing_sides_take_either(o in text(), a in text()) {
            let result = merge(&o, &a, &a);
            prop_assert!(result.clean());
            prop_assert_eq!(result.to_text(None, None), a);
        }
    }
}
