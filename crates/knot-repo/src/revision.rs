//! Revision expressions: `<ref>`, `@`, `<rev>^`, `<rev>^N`, `<rev>~N`,
//! and full or abbreviated object ids.

use std::fmt;

use knot_refs::{validate_branch_name, Refs};
use knot_store::{Database, Object, ObjectKind};
use knot_types::ObjectId;

use crate::error::{RepoError, RepoResult};

/// Alias for the current commit.
pub const HEAD: &str = "@";

/// A problem met while resolving, with optional follow-up lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HintedError {
    pub message: String,
    pub hints: Vec<String>,
}

impl fmt::Display for HintedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;
        for hint in &self.hints {
            writeln!(f, "hint: {hint}")?;
        }
        Ok(())
    }
}

/// Parsed revision expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rev {
    Ref(String),
    /// The Nth parent; `^0` is the commit itself.
    Parent(Box<Rev>, usize),
    /// Follow first parents N times.
    Ancestor(Box<Rev>, usize),
}

impl Rev {
    pub fn parse(expr: &str) -> Option<Rev> {
        if let Some((rev, n)) = split_suffix(expr, '^', true) {
            return Some(Rev::Parent(Box::new(Rev::parse(rev)?), n.unwrap_or(1)));
        }
        if let Some((rev, Some(n))) = split_suffix(expr, '~', false) {
            return Some(Rev::Ancestor(Box::new(Rev::parse(rev)?), n));
        }
        if validate_branch_name(expr).is_err() {
            return None;
        }
        let name = if expr == HEAD { "HEAD" } else { expr };
        Some(Rev::Ref(name.to_string()))
    }
}

/// Split `<rev><marker><digits>` at the last `marker`. The digits may be
/// absent only when `optional` is set.
fn split_suffix(expr: &str, marker: char, optional: bool) -> Option<(&str, Option<usize>)> {
    let at = expr.rfind(marker)?;
    let (rev, digits) = (&expr[..at], &expr[at + 1..]);
    if rev.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if digits.is_empty() {
        return optional.then_some((rev, None));
    }
    digits.parse().ok().map(|n| (rev, Some(n)))
}

pub struct Revision<'a> {
    db: &'a Database,
    refs: &'a Refs,
    expr: String,
    query: Option<Rev>,
    errors: Vec<HintedError>,
}

impl<'a> Revision<'a> {
    pub fn new(db: &'a Database, refs: &'a Refs, expr: impl Into<String>) -> Self {
        let expr = expr.into();
        Self {
            db,
            refs,
            query: Rev::parse(&expr),
            expr,
            errors: Vec::new(),
        }
    }

    /// Resolve to an object id, optionally requiring a particular kind.
    pub fn resolve(&mut self, kind: Option<ObjectKind>) -> RepoResult<ObjectId> {
        let oid = match self.query.clone() {
            Some(query) => self.evaluate(&query)?,
            None => None,
        };
        let oid = match (oid, kind) {
            (Some(oid), Some(kind)) => self.load_typed(&oid, kind)?.map(|_| oid),
            (oid, _) => oid,
        };
        oid.ok_or_else(|| RepoError::InvalidObject {
            message: format!("Not a valid object name: '{}'.", self.expr),
            errors: std::mem::take(&mut self.errors),
        })
    }

    /// Resolve to a commit id.
    pub fn commit(&mut self) -> RepoResult<ObjectId> {
        self.resolve(Some(ObjectKind::Commit))
    }

    fn evaluate(&mut self, rev: &Rev) -> RepoResult<Option<ObjectId>> {
        match rev {
            Rev::Ref(name) => self.read_ref(name),
            Rev::Parent(rev, n) => match self.evaluate(rev)? {
                Some(oid) => self.commit_parent(&oid, *n),
                None => Ok(None),
            },
            Rev::Ancestor(rev, n) => {
                let mut oid = self.evaluate(rev)?;
                for _ in 0..*n {
                    oid = match oid {
                        Some(oid) => self.commit_parent(&oid, 1)?,
                        None => break,
                    };
                }
                Ok(oid)
            }
        }
    }

    fn commit_parent(&mut self, oid: &ObjectId, n: usize) -> RepoResult<Option<ObjectId>> {
        let Some(Object::Commit(commit)) = self.load_typed(oid, ObjectKind::Commit)? else {
            return Ok(None);
        };
        if n == 0 {
            return Ok(Some(*oid));
        }
        Ok(commit.parents.get(n - 1).copied())
    }

    fn load_typed(&mut self, oid: &ObjectId, kind: ObjectKind) -> RepoResult<Option<Object>> {
        let object = self.db.load(oid)?;
        if object.kind() == kind {
            return Ok(Some(object));
        }
        self.errors.push(HintedError {
            message: format!("object {oid} is a {}, not a {kind}", object.kind()),
            hints: Vec::new(),
        });
        Ok(None)
    }

    fn read_ref(&mut self, name: &str) -> RepoResult<Option<ObjectId>> {
        if let Some(oid) = self.refs.read_ref(name)? {
            return Ok(Some(oid));
        }
        let candidates = self.db.prefix_match(name)?;
        match candidates.len() {
            1 => Ok(Some(candidates[0])),
            0 => Ok(None),
            _ => {
                self.log_ambiguous(name, candidates)?;
                Ok(None)
            }
        }
    }

    fn log_ambiguous(&mut self, name: &str, mut candidates: Vec<ObjectId>) -> RepoResult<()> {
        candidates.sort();
        let mut hints = vec!["The candidates are:".to_string()];
        for oid in &candidates {
            let object = self.db.load(oid)?;
            let info = format!("  {} {}", self.db.short_oid(oid), object.kind());
            hints.push(match object {
                Object::Commit(commit) => format!(
                    "{info} {} - {}",
                    commit.author.short_date(),
                    commit.title_line()
                ),
                _ => info,
            });
        }
        self.errors.push(HintedError {
            message: format!("short SHA1 {name} is ambiguous"),
            hints,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRepo;

    fn r(name: &str) -> Box<Rev> {
        Box::new(Rev::Ref(name.into()))
    }

    // -----------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------

    #[test]
    fn parses_refs_and_alias() {
        assert_eq!(Rev::parse("master"), Some(Rev::Ref("master".into())));
        assert_eq!(Rev::parse("@"), Some(Rev::Ref("HEAD".into())));
        assert_eq!(Rev::parse("topic/x"), Some(Rev::Ref("topic/x".into())));
    }

    #[test]
    fn parses_parent_and_ancestor_suffixes() {
        assert_eq!(Rev::parse("@^"), Some(Rev::Parent(r("HEAD"), 1)));
        assert_eq!(Rev::parse("master^2"), Some(Rev::Parent(r("master"), 2)));
        assert_eq!(Rev::parse("HEAD~3"), Some(Rev::Ancestor(r("HEAD"), 3)));
        assert_eq!(
            Rev::parse("@~2^"),
            Some(Rev::Parent(Box::new(Rev::Ancestor(r("HEAD"), 2)), 1))
        );
        assert_eq!(
            Rev::parse("a^^"),
            Some(Rev::Parent(Box::new(Rev::Parent(r("a"), 1)), 1))
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert_eq!(Rev::parse(""), None);
        assert_eq!(Rev::parse("^"), None);
        assert_eq!(Rev::parse("HEAD~"), None);
        assert_eq!(Rev::parse("a..b"), None);
        assert_eq!(Rev::parse(".hidden"), None);
        assert_eq!(Rev::parse("x^y"), None);
    }

    // -----------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------

    #[test]
    fn resolves_against_history() {
        let mut t = TestRepo::new();
        let a = t.commit_file("f.txt", "1\n", "first");
        let b = t.commit_file("f.txt", "2\n", "second");
        let c = t.commit_file("f.txt", "3\n", "third");

        let repo = &t.repo;
        let resolve = |expr: &str| Revision::new(repo.database(), repo.refs(), expr).commit();
        assert_eq!(resolve("@").unwrap(), c);
        assert_eq!(resolve("HEAD^").unwrap(), b);
        assert_eq!(resolve("master~2").unwrap(), a);
        assert_eq!(resolve("@^0").unwrap(), c);
        assert_eq!(resolve(&c.to_hex()).unwrap(), c);
        assert_eq!(resolve(&a.to_hex()[..8]).unwrap(), a);
    }

    #[test]
    fn walking_past_the_root_is_invalid() {
        let mut t = TestRepo::new();
        t.commit_file("f.txt", "1\n", "first");
        let repo = &t.repo;
        let err = Revision::new(repo.database(), repo.refs(), "@~5")
            .commit()
            .unwrap_err();
        assert_eq!(err.to_string(), "Not a valid object name: '@~5'.");
    }

    #[test]
    fn wrong_kind_is_reported_with_detail() {
        let mut t = TestRepo::new();
        let c = t.commit_file("f.txt", "1\n", "first");
        let tree = t.repo.database().load_commit(&c).unwrap().tree;

        let repo = &t.repo;
        let err = Revision::new(repo.database(), repo.refs(), tree.to_hex())
            .commit()
            .unwrap_err();
        let RepoError::InvalidObject { errors, .. } = err else {
            panic!("expected InvalidObject");
        };
        assert_eq!(errors[0].message, format!("object {tree} is a tree, not a commit"));

        let found = Revision::new(repo.database(), repo.refs(), tree.to_hex())
            .resolve(None)
            .unwrap();
        assert_eq!(found, tree);
    }

    #[test]
    fn ambiguous_abbreviation_lists_candidates() {
        let t = TestRepo::new();
        let db = t.repo.database();
        // Blobs until two share a two-character prefix.
        let mut by_prefix = std::collections::HashMap::new();
        let mut pair = None;
        for i in 0.. {
            let oid = db
                .store(&knot_store::Blob::new(format!("blob {i}\n")).into())
                .unwrap();
            let prefix = oid.to_hex()[..2].to_string();
            if let Some(other) = by_prefix.insert(prefix.clone(), oid) {
                pair = Some((prefix, other, oid));
                break;
            }
        }
        let (prefix, x, y) = pair.unwrap();

        let err = Revision::new(db, t.repo.refs(), prefix.clone())
            .resolve(None)
            .unwrap_err();
        let RepoError::InvalidObject { errors, .. } = err else {
            panic!("expected InvalidObject");
        };
        assert_eq!(errors[0].message, format!("short SHA1 {prefix} is ambiguous"));
        let mut expected = vec![x, y];
        expected.sort();
        assert_eq!(
            errors[0].hints,
            vec![
                "The candidates are:".to_string(),
                format!("  {} blob", expected[0].short_hex()),
                format!("  {} blob", expected[1].short_hex()),
            ]
        );
    }
}
