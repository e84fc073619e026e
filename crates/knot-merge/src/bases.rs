//! Best common ancestors of two commits.

use std::collections::HashSet;

use knot_store::{Database, StoreResult};
use knot_types::ObjectId;
use tracing::debug;

use crate::common_ancestors::{CommonAncestors, Flags};

/// Merge bases of two commits: the common ancestors that are not
/// themselves ancestors of another candidate.
pub struct Bases<'a> {
    db: &'a Database,
    common: CommonAncestors<'a>,
}

impl<'a> Bases<'a> {
    pub fn new(db: &'a Database, one: &ObjectId, two: &ObjectId) -> StoreResult<Self> {
        Ok(Self {
            db,
            common: CommonAncestors::new(db, one, &[*two])?,
        })
    }

    pub fn find(&mut self) -> StoreResult<Vec<ObjectId>> {
        let commits = self.common.find()?;
        if commits.len() <= 1 {
            return Ok(commits);
        }

        let mut redundant = HashSet::new();
        for commit in &commits {
            self.filter_commit(commit, &commits, &mut redundant)?;
        }
        debug!(candidates = commits.len(), redundant = redundant.len(), "merge bases reduced");
        Ok(commits
            .into_iter()
            .filter(|c| !redundant.contains(c))
            .collect())
    }

    /// Walk from `commit` against every other live candidate. If a
    /// candidate reaches `commit`, `commit` is an ancestor of it; any
    /// candidate reached from `commit` is an ancestor of `commit`.
    fn filter_commit(
        &self,
        commit: &ObjectId,
        commits: &[ObjectId],
        redundant: &mut HashSet<ObjectId>,
    ) -> StoreResult<()> {
        if redundant.contains(commit) {
            return Ok(());
        }
        let others: Vec<ObjectId> = commits
            .iter()
            .filter(|c| *c != commit && !redundant.contains(*c))
            .copied()
            .collect();

        let mut common = CommonAncestors::new(self.db, commit, &others)?;
        common.find()?;

        if common.marked(commit, Flags::PARENT2) {
            redundant.insert(*commit);
        }
        redundant.extend(others.into_iter().filter(|oid| common.marked(oid, Flags::PARENT1)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Graph;

    #[test]
    fn fork_point_is_the_base() {
        //  A <- B <- C
        //        \
        //         D
        let mut g = Graph::new();
        let a = g.commit("A", &[]);
        let b = g.commit("B", &[a]);
        let c = g.commit("C", &[b]);
        let d = g.commit("D", &[b]);

        assert_eq!(Bases::new(&g.db, &c, &d).unwrap().find().unwrap(), vec![b]);
        assert_eq!(Bases::new(&g.db, &d, &c).unwrap().find().unwrap(), vec![b]);
    }

    #[test]
    fn ancestor_is_its_own_base() {
        let mut g = Graph::new();
        let a = g.commit("A", &[]);
        let b = g.commit("B", &[a]);

        assert_eq!(Bases::new(&g.db, &b, &a).unwrap().find().unwrap(), vec![a]);
        assert_eq!(Bases::new(&g.db, &a, &b).unwrap().find().unwrap(), vec![a]);
    }

    #[test]
    fn criss_cross_keeps_both_independent_bases() {
        let mut g = Graph::new();
        let a = g.commit("A", &[]);
        let b = g.commit("B", &[a]);
        let c = g.commit("C", &[a]);
        let d = g.commit("D", &[b, c]);
        let e = g.commit("E", &[c, b]);

        let mut bases = Bases::new(&g.db, &d, &e).unwrap().find().unwrap();
        bases.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(bases, expected);
    }

    #[test]
    fn redundant_candidate_is_removed() {
        let mut g = Graph::new();
        let a = g.commit("A", &[]);
        let b = g.commit("B", &[a]);
        let mut redundant = HashSet::new();
        let bases = Bases::new(&g.db, &b, &b).unwrap();
        bases.filter_commit(&a, &[a, b], &mut redundant).unwrap();
        assert!(redundant.contains(&a));
        assert!(!redundant.contains(&b));
    }
}
