//! Common-ancestor search over the commit graph.
//!
//! Both sides are walked together, newest commit first. Every visited
//! commit carries the set of sides that reached it. The first time a commit
//! is reached from both sides it becomes a result, and everything below it
//! is marked stale so that older shared history cannot also be reported.
//! The walk ends once only stale commits remain queued.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitOr};

use chrono::{DateTime, FixedOffset};
use knot_store::{Database, StoreResult};
use knot_types::ObjectId;
use tracing::trace;

/// Walk state attached to a commit.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Reachable from the first input.
    pub const PARENT1: Flags = Flags(1);
    /// Reachable from one of the other inputs.
    pub const PARENT2: Flags = Flags(1 << 1);
    /// Reached from both sides before becoming stale.
    pub const RESULT: Flags = Flags(1 << 2);
    /// Below a result; cannot be a best common ancestor.
    pub const STALE: Flags = Flags(1 << 3);

    const BOTH_PARENTS: Flags = Flags(Self::PARENT1.0 | Self::PARENT2.0);
    /// The flags handed down from a commit to its parents.
    const PROPAGATED: Flags = Flags(Self::BOTH_PARENTS.0 | Self::STALE.0);

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitAnd for Flags {
    type Output = Flags;

    fn bitand(self, rhs: Flags) -> Flags {
        Flags(self.0 & rhs.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::PARENT1, "PARENT1"),
            (Self::PARENT2, "PARENT2"),
            (Self::RESULT, "RESULT"),
            (Self::STALE, "STALE"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Flags({})", set.join(" | "))
    }
}

#[derive(Clone, Debug)]
struct QueuedCommit {
    oid: ObjectId,
    date: DateTime<FixedOffset>,
    parents: Vec<ObjectId>,
}

/// Newest first; a commit goes after every queued commit of the same date.
fn insert_by_date(list: &mut Vec<QueuedCommit>, commit: QueuedCommit) {
    let at = list
        .iter()
        .position(|c| c.date < commit.date)
        .unwrap_or(list.len());
    list.insert(at, commit);
}

pub struct CommonAncestors<'a> {
    db: &'a Database,
    flags: HashMap<ObjectId, Flags>,
    queue: Vec<QueuedCommit>,
    results: Vec<QueuedCommit>,
}

impl<'a> CommonAncestors<'a> {
    /// Prepare a walk from `one` (side 1) against every commit in `twos`
    /// (side 2).
    pub fn new(db: &'a Database, one: &ObjectId, twos: &[ObjectId]) -> StoreResult<Self> {
        let mut walk = Self {
            db,
            flags: HashMap::new(),
            queue: Vec::new(),
            results: Vec::new(),
        };
        walk.seed(one, Flags::PARENT1)?;
        for two in twos {
            walk.seed(two, Flags::PARENT2)?;
        }
        Ok(walk)
    }

    fn seed(&mut self, oid: &ObjectId, flag: Flags) -> StoreResult<()> {
        let commit = self.load(oid)?;
        insert_by_date(&mut self.queue, commit);
        self.flags.entry(*oid).or_default().insert(flag);
        Ok(())
    }

    fn load(&self, oid: &ObjectId) -> StoreResult<QueuedCommit> {
        let commit = self.db.load_commit(oid)?;
        Ok(QueuedCommit {
            oid: *oid,
            date: commit.date(),
            parents: commit.parents,
        })
    }

    /// Run the walk and return the common ancestors that are not below
    /// another result, newest first.
    pub fn find(&mut self) -> StoreResult<Vec<ObjectId>> {
        while !self.all_stale() {
            self.process_queue()?;
        }
        Ok(self
            .results
            .iter()
            .map(|c| c.oid)
            .filter(|oid| !self.marked(oid, Flags::STALE))
            .collect())
    }

    /// Whether the walk has tagged `oid` with `flag`.
    pub fn marked(&self, oid: &ObjectId, flag: Flags) -> bool {
        self.flags.get(oid).is_some_and(|f| f.contains(flag))
    }

    fn all_stale(&self) -> bool {
        self.queue.iter().all(|c| self.marked(&c.oid, Flags::STALE))
    }

    fn process_queue(&mut self) -> StoreResult<()> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let commit = self.queue.remove(0);
        let mut flags =
            self.flags.get(&commit.oid).copied().unwrap_or_default() & Flags::PROPAGATED;

        if flags == Flags::BOTH_PARENTS {
            if !self.marked(&commit.oid, Flags::RESULT) {
                trace!(oid = %commit.oid, "common ancestor reached");
                self.flags.entry(commit.oid).or_default().insert(Flags::RESULT);
                insert_by_date(&mut self.results, commit.clone());
            }
            flags.insert(Flags::STALE);
        }
        self.add_parents(&commit, flags)
    }

    fn add_parents(&mut self, commit: &QueuedCommit, flags: Flags) -> StoreResult<()> {
        for parent in &commit.parents {
            let current = self.flags.get(parent).copied().unwrap_or_default();
            if self.flags.contains_key(parent) && current.contains(flags) {
                continue;
            }
            self.flags.insert(*parent, current | flags);
            let queued = self.load(parent)?;
            insert_by_date(&mut self.queue, queued);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Graph;

    #[test]
    fn flags_combine_and_test() {
        let mut flags = Flags::PARENT1;
        assert!(!flags.contains(Flags::BOTH_PARENTS));
        flags.insert(Flags::PARENT2);
        assert!(flags.contains(Flags::BOTH_PARENTS));
        assert!(!flags.contains(Flags::STALE));
        assert!(Flags::NONE.contains(Flags::NONE));
        assert_eq!(format!("{:?}", flags | Flags::STALE), "Flags(PARENT1 | PARENT2 | STALE)");
    }

    #[test]
    fn linear_history_finds_older_commit() {
        //  A <- B <- C
        let mut g = Graph::new();
        let a = g.commit("A", &[]);
        let b = g.commit("B", &[a]);
        let c = g.commit("C", &[b]);

        let mut walk = CommonAncestors::new(&g.db, &c, &[a]).unwrap();
        assert_eq!(walk.find().unwrap(), vec![a]);
        assert!(walk.marked(&a, Flags::RESULT));
        assert!(walk.marked(&b, Flags::PARENT1));
        assert!(!walk.marked(&b, Flags::PARENT2));
    }

    #[test]
    fn forked_history_finds_fork_point_and_marks_older_stale() {
        //  A <- B <- C <- D
        //             \
        //              E <- F
        let mut g = Graph::new();
        let a = g.commit("A", &[]);
        let b = g.commit("B", &[a]);
        let c = g.commit("C", &[b]);
        let d = g.commit("D", &[c]);
        let e = g.commit("E", &[c]);
        let f = g.commit("F", &[e]);

        let mut walk = CommonAncestors::new(&g.db, &d, &[f]).unwrap();
        assert_eq!(walk.find().unwrap(), vec![c]);
        assert!(walk.marked(&b, Flags::STALE));
        assert!(!walk.marked(&d, Flags::PARENT2));
    }

    #[test]
    fn same_commit_on_both_sides() {
        let mut g = Graph::new();
        let a = g.commit("A", &[]);
        let b = g.commit("B", &[a]);

        let mut walk = CommonAncestors::new(&g.db, &b, &[b]).unwrap();
        assert_eq!(walk.find().unwrap(), vec![b]);
    }

    #[test]
    fn unrelated_histories_have_no_common_ancestor() {
        let mut g = Graph::new();
        let a = g.commit("A", &[]);
        let x = g.commit("X", &[]);

        let mut walk = CommonAncestors::new(&g.db, &a, &[x]).unwrap();
        assert!(walk.find().unwrap().is_empty());
    }

    #[test]
    fn criss_cross_reports_both_candidates() {
        //  A <- B <--- D <- F
        //   \     \ /
        //    \     X
        //     \   / \
        //      C <--- E <- G
        let mut g = Graph::new();
        let a = g.commit("A", &[]);
        let b = g.commit("B", &[a]);
        let c = g.commit("C", &[a]);
        let d = g.commit("D", &[b, c]);
        let e = g.commit("E", &[c, b]);
        let f = g.commit("F", &[d]);
        let h = g.commit("G", &[e]);

        let mut walk = CommonAncestors::new(&g.db, &f, &[h]).unwrap();
        let mut found = walk.find().unwrap();
        found.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(found, expected);
    }
}
