//! Commit history walks.
//!
//! Starting points are revisions, `a..b` ranges and `^a` exclusions; an
//! argument naming an existing workspace path restricts the walk to commits
//! that touch it. Commits come out newest first. When anything is
//! excluded, the walk runs in limited mode: the queue is drained up front
//! until only uninteresting commits are left, so that history reachable
//! from an exclusion is never reported even if it is dated later.

use std::collections::{HashMap, HashSet};

use knot_diff::tree_diff;
use knot_refs::Refs;
use knot_store::{Commit, Database, Entry};
use knot_types::ObjectId;
use knot_workspace::Workspace;
use tracing::trace;

use crate::error::{RepoError, RepoResult};
use crate::revision::{Revision, HEAD};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Mark {
    Seen,
    Added,
    Uninteresting,
    Treesame,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RevListOptions {
    /// Also yield the trees and blobs reachable from output commits.
    pub objects: bool,
    /// Follow parents; when off only the named commits are listed.
    pub walk: bool,
    /// Skip revisions that do not resolve instead of failing.
    pub missing: bool,
}

impl Default for RevListOptions {
    fn default() -> Self {
        Self {
            objects: false,
            walk: true,
            missing: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevListItem {
    Commit { oid: ObjectId, commit: Commit },
    Object { path: String, entry: Entry },
}

pub struct RevList<'a> {
    db: &'a Database,
    refs: &'a Refs,
    options: RevListOptions,
    commits: HashMap<ObjectId, Commit>,
    flags: HashMap<ObjectId, HashSet<Mark>>,
    queue: Vec<ObjectId>,
    limited: bool,
    prune: Vec<String>,
    diffs: HashMap<(Option<ObjectId>, ObjectId), bool>,
    pending: Vec<Entry>,
}

impl<'a> RevList<'a> {
    pub fn new<S: AsRef<str>>(
        db: &'a Database,
        refs: &'a Refs,
        workspace: &dyn Workspace,
        revs: &[S],
        options: RevListOptions,
    ) -> RepoResult<Self> {
        let mut list = Self {
            db,
            refs,
            options,
            commits: HashMap::new(),
            flags: HashMap::new(),
            queue: Vec::new(),
            limited: false,
            prune: Vec::new(),
            diffs: HashMap::new(),
            pending: Vec::new(),
        };
        for rev in revs {
            list.handle_revision(workspace, rev.as_ref())?;
        }
        if list.queue.is_empty() {
            list.set_start_point(HEAD, true)?;
        }
        Ok(list)
    }

    /// Run the walk, handing every output commit (and object) to `f`.
    pub fn each(mut self, mut f: impl FnMut(RevListItem)) -> RepoResult<()> {
        if self.limited {
            self.limit_list()?;
        }
        if self.options.objects {
            self.mark_edges_uninteresting()?;
        }
        self.traverse_commits(&mut f)?;
        self.traverse_pending(&mut f)
    }

    /// The output commits, newest first.
    pub fn commits(self) -> RepoResult<Vec<(ObjectId, Commit)>> {
        let mut out = Vec::new();
        self.each(|item| {
            if let RevListItem::Commit { oid, commit } = item {
                out.push((oid, commit));
            }
        })?;
        Ok(out)
    }

    // ---------------------------------------------------------------
    // Starting points
    // ---------------------------------------------------------------

    fn handle_revision(&mut self, workspace: &dyn Workspace, rev: &str) -> RepoResult<()> {
        if workspace.stat_file(rev)?.is_some() {
            self.prune.push(rev.to_string());
        } else if let Some((from, to)) = rev.split_once("..") {
            self.set_start_point(from, false)?;
            self.set_start_point(to, true)?;
            self.options.walk = true;
        } else if let Some(excluded) = rev.strip_prefix('^').filter(|r| !r.is_empty()) {
            self.set_start_point(excluded, false)?;
            self.options.walk = true;
        } else {
            self.set_start_point(rev, true)?;
        }
        Ok(())
    }

    fn set_start_point(&mut self, rev: &str, interesting: bool) -> RepoResult<()> {
        let rev = if rev.is_empty() { HEAD } else { rev };
        let oid = match Revision::new(self.db, self.refs, rev).commit() {
            Ok(oid) => oid,
            Err(RepoError::InvalidObject { .. }) if self.options.missing => return Ok(()),
            Err(e) => return Err(e),
        };
        self.load_commit(&oid)?;
        self.enqueue_commit(oid);

        if !interesting {
            self.limited = true;
            self.mark(oid, Mark::Uninteresting);
            self.mark_parents_uninteresting(&oid);
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Walking
    // ---------------------------------------------------------------

    fn limit_list(&mut self) -> RepoResult<()> {
        let mut output = Vec::new();
        while self.still_interesting(&output) {
            let oid = self.queue.remove(0);
            self.add_parents(&oid)?;
            if !self.marked(&oid, Mark::Uninteresting) {
                output.push(oid);
            }
        }
        self.queue = output;
        Ok(())
    }

    /// Keep draining while an interesting commit is still queued, or while
    /// the queue holds something newer than the oldest output.
    fn still_interesting(&self, output: &[ObjectId]) -> bool {
        let Some(newest_in) = self.queue.first() else {
            return false;
        };
        if let Some(oldest_out) = output.last() {
            if self.date(oldest_out) <= self.date(newest_in) {
                return true;
            }
        }
        self.queue
            .iter()
            .any(|oid| !self.marked(oid, Mark::Uninteresting))
    }

    fn traverse_commits(&mut self, f: &mut impl FnMut(RevListItem)) -> RepoResult<()> {
        while !self.queue.is_empty() {
            let oid = self.queue.remove(0);
            if !self.limited {
                self.add_parents(&oid)?;
            }
            if self.marked(&oid, Mark::Uninteresting) || self.marked(&oid, Mark::Treesame) {
                continue;
            }
            let commit = self.load_commit(&oid)?;
            self.pending.push(Entry::tree(commit.tree));
            f(RevListItem::Commit { oid, commit });
        }
        Ok(())
    }

    fn add_parents(&mut self, oid: &ObjectId) -> RepoResult<()> {
        if !self.options.walk || !self.mark(*oid, Mark::Added) {
            return Ok(());
        }

        let parents = if self.marked(oid, Mark::Uninteresting) {
            let parents = self.load_commit(oid)?.parents;
            for parent in &parents {
                self.load_commit(parent)?;
                self.mark(*parent, Mark::Uninteresting);
                self.mark_parents_uninteresting(parent);
            }
            parents
        } else {
            self.simplify_commit(oid)?
        };

        for parent in parents {
            self.load_commit(&parent)?;
            self.enqueue_commit(parent);
        }
        Ok(())
    }

    /// Mark every loaded ancestor of `oid` uninteresting. Commits not yet
    /// loaded carry the mark and hand it down once they are processed.
    fn mark_parents_uninteresting(&mut self, oid: &ObjectId) {
        let mut stack: Vec<ObjectId> = self
            .commits
            .get(oid)
            .map(|c| c.parents.clone())
            .unwrap_or_default();
        while let Some(parent) = stack.pop() {
            if !self.mark(parent, Mark::Uninteresting) {
                continue;
            }
            if let Some(commit) = self.commits.get(&parent) {
                stack.extend(commit.parents.iter().copied());
            }
        }
    }

    /// With path filters, follow only the first parent that leaves the
    /// filtered paths unchanged, and mark the commit as not touching them.
    fn simplify_commit(&mut self, oid: &ObjectId) -> RepoResult<Vec<ObjectId>> {
        let parents = self.load_commit(oid)?.parents;
        if self.prune.is_empty() {
            return Ok(parents);
        }

        let candidates: Vec<Option<ObjectId>> = if parents.is_empty() {
            vec![None]
        } else {
            parents.iter().copied().map(Some).collect()
        };
        for parent in candidates {
            if self.tree_same(parent, *oid)? {
                trace!(%oid, "commit leaves filtered paths unchanged");
                self.mark(*oid, Mark::Treesame);
                return Ok(parent.into_iter().collect());
            }
        }
        Ok(parents)
    }

    fn tree_same(&mut self, old: Option<ObjectId>, new: ObjectId) -> RepoResult<bool> {
        if let Some(same) = self.diffs.get(&(old, new)) {
            return Ok(*same);
        }
        let same = tree_diff(self.db, old.as_ref(), Some(&new), self.prune.as_slice())?.is_empty();
        self.diffs.insert((old, new), same);
        Ok(same)
    }

    /// Queue newest first; with walking off, keep the given order.
    fn enqueue_commit(&mut self, oid: ObjectId) {
        if !self.mark(oid, Mark::Seen) {
            return;
        }
        if !self.options.walk {
            self.queue.push(oid);
            return;
        }
        let date = self.date(&oid);
        let at = self
            .queue
            .iter()
            .position(|c| self.date(c) < date)
            .unwrap_or(self.queue.len());
        self.queue.insert(at, oid);
    }

    // ---------------------------------------------------------------
    // Objects
    // ---------------------------------------------------------------

    fn mark_edges_uninteresting(&mut self) -> RepoResult<()> {
        for oid in self.queue.clone() {
            let commit = self.load_commit(&oid)?;
            if self.marked(&oid, Mark::Uninteresting) {
                self.mark_tree_uninteresting(commit.tree)?;
            }
            for parent in &commit.parents {
                if self.marked(parent, Mark::Uninteresting) {
                    let tree = self.load_commit(parent)?.tree;
                    self.mark_tree_uninteresting(tree)?;
                }
            }
        }
        Ok(())
    }

    fn mark_tree_uninteresting(&mut self, tree: ObjectId) -> RepoResult<()> {
        let mut stack = vec![Entry::tree(tree)];
        while let Some(entry) = stack.pop() {
            if !self.mark(entry.object_id, Mark::Uninteresting) {
                continue;
            }
            if entry.is_tree() {
                let tree = self.db.load_tree(&entry.object_id)?;
                stack.extend(tree.entries.iter().map(|e| e.entry()));
            }
        }
        Ok(())
    }

    fn traverse_pending(&mut self, f: &mut impl FnMut(RevListItem)) -> RepoResult<()> {
        if !self.options.objects {
            return Ok(());
        }
        for root in std::mem::take(&mut self.pending) {
            let mut stack = vec![(String::new(), root)];
            while let Some((path, entry)) = stack.pop() {
                if self.marked(&entry.object_id, Mark::Uninteresting)
                    || !self.mark(entry.object_id, Mark::Seen)
                {
                    continue;
                }
                if entry.is_tree() {
                    let tree = self.db.load_tree(&entry.object_id)?;
                    for child in tree.entries.iter().rev() {
                        let child_path = if path.is_empty() {
                            child.name.clone()
                        } else {
                            format!("{path}/{}", child.name)
                        };
                        stack.push((child_path, child.entry()));
                    }
                }
                f(RevListItem::Object { path, entry });
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------

    fn load_commit(&mut self, oid: &ObjectId) -> RepoResult<Commit> {
        if let Some(commit) = self.commits.get(oid) {
            return Ok(commit.clone());
        }
        let commit = self.db.load_commit(oid)?;
        self.commits.insert(*oid, commit.clone());
        Ok(commit)
    }

    fn date(&self, oid: &ObjectId) -> i64 {
        self.commits
            .get(oid)
            .map(|c| c.date().timestamp())
            .unwrap_or_default()
    }

    /// Set `mark` on `oid`; false when it was already set.
    fn mark(&mut self, oid: ObjectId, mark: Mark) -> bool {
        self.flags.entry(oid).or_default().insert(mark)
    }

    fn marked(&self, oid: &ObjectId, mark: Mark) -> bool {
        self.flags.get(oid).is_some_and(|m| m.contains(&mark))
    }
}
