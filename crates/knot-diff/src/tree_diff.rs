//! Tree-level diff: compare two snapshots path by path.
//!
//! Both trees are walked in lock-step. Equal ids short-circuit, so shared
//! subtrees are never loaded. Directory pairs recurse instead of producing a
//! change; a file replaced by a directory (or the reverse) records the file
//! side and recurses into the directory side.

use std::collections::{BTreeMap, BTreeSet};

use knot_store::{Database, Entry, Tree};
use knot_types::ObjectId;

use crate::error::DiffResult;

/// Changes between two trees: path -> (old entry, new entry).
pub type TreeChanges = BTreeMap<String, (Option<Entry>, Option<Entry>)>;

/// How a single path changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
}

impl ChangeKind {
    pub fn of(change: &(Option<Entry>, Option<Entry>)) -> Self {
        match change {
            (None, _) => Self::Added,
            (_, None) => Self::Deleted,
            _ => Self::Modified,
        }
    }
}

static NO_ROUTES: PathFilter = PathFilter {
    routes: BTreeMap::new(),
};

/// Routing trie restricting a tree walk to some path prefixes.
///
/// An empty node admits every name below it, so the filter built from
/// `["src/lib"]` descends only into `src`, then only into `src/lib`, and
/// then admits everything under `src/lib`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathFilter {
    routes: BTreeMap<String, PathFilter>,
}

impl PathFilter {
    pub fn build<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = Self::default();
        for path in paths {
            let mut table = &mut root;
            for name in path.as_ref().split('/').filter(|s| !s.is_empty()) {
                table = table.routes.entry(name.to_string()).or_default();
            }
        }
        root
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn allows(&self, name: &str) -> bool {
        self.routes.is_empty() || self.routes.contains_key(name)
    }

    /// The sub-filter that applies below `name`.
    pub fn join(&self, name: &str) -> &PathFilter {
        self.routes.get(name).unwrap_or(&NO_ROUTES)
    }
}

/// Structural differencer between two commits or trees.
pub struct TreeDiff<'a> {
    db: &'a Database,
    filter: PathFilter,
}

impl<'a> TreeDiff<'a> {
    pub fn new(db: &'a Database, filter: PathFilter) -> Self {
        Self { db, filter }
    }

    /// Diff `a` against `b`; either may be a commit or a tree id, and a
    /// missing side is treated as an empty tree.
    pub fn compare_oids(&self, a: Option<&ObjectId>, b: Option<&ObjectId>) -> DiffResult<TreeChanges> {
        let mut changes = TreeChanges::new();
        self.compare(a, b, "", &self.filter, &mut changes)?;
        Ok(changes)
    }

    fn compare(
        &self,
        a: Option<&ObjectId>,
        b: Option<&ObjectId>,
        prefix: &str,
        filter: &PathFilter,
        changes: &mut TreeChanges,
    ) -> DiffResult<()> {
        if a == b {
            return Ok(());
        }
        let a_tree = self.tree_for(a)?;
        let b_tree = self.tree_for(b)?;

        self.detect_deletions(&a_tree, &b_tree, prefix, filter, changes)?;
        self.detect_additions(&a_tree, &b_tree, prefix, filter, changes)
    }

    fn tree_for(&self, id: Option<&ObjectId>) -> DiffResult<Tree> {
        match id {
            Some(id) => {
                let root = self.db.root_tree(id)?;
                Ok(self.db.load_tree(&root)?)
            }
            None => Ok(Tree::empty()),
        }
    }

    fn detect_deletions(
        &self,
        a: &Tree,
        b: &Tree,
        prefix: &str,
        filter: &PathFilter,
        changes: &mut TreeChanges,
    ) -> DiffResult<()> {
        for item in &a.entries {
            if !filter.allows(&item.name) {
                continue;
            }
            let path = join_path(prefix, &item.name);
            let entry = item.entry();
            let other = b.get(&item.name).map(|e| e.entry());
            if other == Some(entry) {
                continue;
            }

            let tree_a = Some(entry).filter(Entry::is_tree).map(|e| e.object_id);
            let tree_b = other.filter(Entry::is_tree).map(|e| e.object_id);
            self.compare(tree_a.as_ref(), tree_b.as_ref(), &path, filter.join(&item.name), changes)?;

            let blobs = (
                Some(entry).filter(|e| !e.is_tree()),
                other.filter(|e| !e.is_tree()),
            );
            if blobs.0.is_some() || blobs.1.is_some() {
                changes.insert(path, blobs);
            }
        }
        Ok(())
    }

    fn detect_additions(
        &self,
        a: &Tree,
        b: &Tree,
        prefix: &str,
        filter: &PathFilter,
        changes: &mut TreeChanges,
    ) -> DiffResult<()> {
        for item in &b.entries {
            if !filter.allows(&item.name) || a.get(&item.name).is_some() {
                continue;
            }
            let path = join_path(prefix, &item.name);
            if item.mode.is_tree() {
                self.compare(None, Some(&item.object_id), &path, filter.join(&item.name), changes)?;
            } else {
                changes.insert(path, (None, Some(item.entry())));
            }
        }
        Ok(())
    }
}

/// Diff two commits or trees, optionally restricted to `prune` paths.
pub fn tree_diff<S: AsRef<str>>(
    db: &Database,
    a: Option<&ObjectId>,
    b: Option<&ObjectId>,
    prune: &[S],
) -> DiffResult<TreeChanges> {
    TreeDiff::new(db, PathFilter::build(prune)).compare_oids(a, b)
}

/// Per-path view of a merge commit against each of its parents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombinedChange {
    /// The entry in each parent, in parent order.
    pub parents: Vec<Option<Entry>>,
    /// The entry in the merge result.
    pub child: Option<Entry>,
}

/// Merge per-parent tree diffs of one child into a combined view.
///
/// A path is included when it appears in at least one parent diff. A parent
/// whose diff does not mention the path holds the same entry as the child.
pub fn combined_changes(diffs: &[TreeChanges]) -> BTreeMap<String, CombinedChange> {
    let paths: BTreeSet<&String> = diffs.iter().flat_map(|d| d.keys()).collect();

    paths
        .into_iter()
        .map(|path| {
            let child = diffs
                .iter()
                .find_map(|d| d.get(path))
                .and_then(|(_, new)| *new);
            let parents = diffs
                .iter()
                .map(|d| match d.get(path) {
                    Some((old, _)) => *old,
                    None => child,
                })
                .collect();
            (path.clone(), CombinedChange { parents, child })
        })
        .collect()
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
