//! Moving the working tree and index from one tree to another.
//!
//! A [`Migration`] is planned from a tree diff. Planning refuses to touch
//! anything that would lose local work: modified tracked files, untracked
//! files in the way, or untracked content inside directories being removed.
//! All such problems are reported together, grouped by kind.

use std::collections::{BTreeMap, BTreeSet};

use knot_diff::TreeChanges;
use knot_index::Index;
use knot_store::{Database, Entry};
use tracing::{debug, warn};

use crate::error::{MigrationError, MigrationResult};
use crate::inspector::Inspector;
use crate::workspace::Workspace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictKind {
    StaleFile,
    StaleDirectory,
    UntrackedOverwritten,
    UntrackedRemoved,
}

impl ConflictKind {
    fn header(self) -> &'static str {
        match self {
            Self::StaleFile => {
                "Your local changes to the following files would be overwritten by checkout:"
            }
            Self::StaleDirectory => {
                "Updating the following directories would lose untracked files in them:"
            }
            Self::UntrackedOverwritten => {
                "The following untracked working tree files would be overwritten by checkout:"
            }
            Self::UntrackedRemoved => {
                "The following untracked working tree files would be removed by checkout:"
            }
        }
    }

    fn footer(self) -> &'static str {
        match self {
            Self::StaleFile => "Please commit your changes or stash them before you switch branches.",
            Self::StaleDirectory => "",
            Self::UntrackedOverwritten | Self::UntrackedRemoved => {
                "Please move or remove them before you switch branches."
            }
        }
    }
}

/// Planned file operations, grouped by action.
#[derive(Clone, Debug, Default)]
pub struct Changes {
    pub create: Vec<(String, Entry)>,
    pub update: Vec<(String, Entry)>,
    pub delete: Vec<String>,
}

#[derive(Debug)]
pub struct Migration {
    diff: TreeChanges,
    pub changes: Changes,
    pub mkdirs: BTreeSet<String>,
    pub rmdirs: BTreeSet<String>,
    conflicts: BTreeMap<ConflictKind, BTreeSet<String>>,
    pub errors: Vec<String>,
}

impl Migration {
    pub fn new(diff: TreeChanges) -> Self {
        Self {
            diff,
            changes: Changes::default(),
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
            conflicts: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Plan, update the working tree, then stage the result in `index`.
    pub fn apply_changes(
        &mut self,
        workspace: &dyn Workspace,
        index: &mut Index,
        db: &Database,
    ) -> MigrationResult<()> {
        self.plan_changes(workspace, index, db)?;
        workspace.apply_migration(self, db)?;
        self.update_index(workspace, index)?;
        debug!(
            created = self.changes.create.len(),
            updated = self.changes.update.len(),
            deleted = self.changes.delete.len(),
            "migration applied"
        );
        Ok(())
    }

    /// Check every changed path for conflicts and record its action.
    pub fn plan_changes(
        &mut self,
        workspace: &dyn Workspace,
        index: &Index,
        db: &Database,
    ) -> MigrationResult<()> {
        let inspector = Inspector::new(workspace, index, db);
        let diff = std::mem::take(&mut self.diff);
        for (path, (old_item, new_item)) in &diff {
            self.check_for_conflict(&inspector, workspace, index, path, old_item.as_ref(), new_item.as_ref())?;
            self.record_change(path, *old_item, *new_item);
        }
        self.diff = diff;
        self.collect_errors()
    }

    fn check_for_conflict(
        &mut self,
        inspector: &Inspector<'_>,
        workspace: &dyn Workspace,
        index: &Index,
        path: &str,
        old_item: Option<&Entry>,
        new_item: Option<&Entry>,
    ) -> MigrationResult<()> {
        let entry = index.entry_for_path(path, 0);
        let differs_from_old = inspector.compare_tree_to_index(old_item, entry).is_some();
        let differs_from_new = inspector.compare_tree_to_index(new_item, entry).is_some();
        if differs_from_old && differs_from_new {
            self.add_conflict(ConflictKind::StaleFile, path);
            return Ok(());
        }

        let stat = workspace.stat_file(path)?;
        let kind = match (&entry, &stat) {
            (Some(_), _) => ConflictKind::StaleFile,
            (None, Some(s)) if s.is_dir() => ConflictKind::StaleDirectory,
            _ if new_item.is_some() => ConflictKind::UntrackedOverwritten,
            _ => ConflictKind::UntrackedRemoved,
        };

        match stat {
            None => {
                if let Some(parent) = self.untracked_parent(inspector, workspace, path)? {
                    let reported = if entry.is_some() { path.to_string() } else { parent };
                    self.add_conflict(kind, &reported);
                }
            }
            Some(stat) if stat.is_file() => {
                if inspector.compare_index_to_workspace(entry, Some(&stat))?.is_some() {
                    self.add_conflict(kind, path);
                }
            }
            Some(stat) if stat.is_dir() => {
                if inspector.trackable_file(path, Some(&stat))? {
                    self.add_conflict(kind, path);
                }
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// The deepest ancestor of `path` that is an untracked file on disk.
    fn untracked_parent(
        &self,
        inspector: &Inspector<'_>,
        workspace: &dyn Workspace,
        path: &str,
    ) -> MigrationResult<Option<String>> {
        for parent in ancestors(path).into_iter().rev() {
            let stat = workspace.stat_file(&parent)?;
            match stat {
                Some(s) if s.is_file() => {
                    if inspector.trackable_file(&parent, Some(&s))? {
                        return Ok(Some(parent));
                    }
                }
                _ => continue,
            }
        }
        Ok(None)
    }

    fn add_conflict(&mut self, kind: ConflictKind, path: &str) {
        self.conflicts.entry(kind).or_default().insert(path.to_string());
    }

    fn collect_errors(&mut self) -> MigrationResult<()> {
        for (kind, paths) in &self.conflicts {
            if paths.is_empty() {
                continue;
            }
            let mut lines = vec![kind.header().to_string()];
            lines.extend(paths.iter().map(|p| format!("\t{p}")));
            lines.push(kind.footer().to_string());
            self.errors.push(lines.join("\n"));
        }
        if self.errors.is_empty() {
            return Ok(());
        }
        warn!(groups = self.errors.len(), "migration refused");
        Err(MigrationError::Conflict(self.errors.clone()))
    }

    fn record_change(&mut self, path: &str, old_item: Option<Entry>, new_item: Option<Entry>) {
        match (old_item, new_item) {
            (None, Some(new)) => {
                self.mkdirs.extend(ancestors(path));
                self.changes.create.push((path.to_string(), new));
            }
            (Some(_), None) => {
                self.rmdirs.extend(ancestors(path));
                self.changes.delete.push(path.to_string());
            }
            (Some(_), Some(new)) => self.changes.update.push((path.to_string(), new)),
            (None, None) => {}
        }
    }

    fn update_index(&self, workspace: &dyn Workspace, index: &mut Index) -> MigrationResult<()> {
        for path in &self.changes.delete {
            index.remove(path);
        }
        for (path, entry) in self.changes.create.iter().chain(&self.changes.update) {
            let stat = workspace.stat_file(path)?.unwrap_or_default();
            index.add(path, entry.object_id, &stat);
        }
        Ok(())
    }
}

/// Proper ancestor directories, shallowest first.
fn ancestors(path: &str) -> Vec<String> {
    path.match_indices('/')
        .map(|(i, _)| path[..i].to_string())
        .collect()
}
