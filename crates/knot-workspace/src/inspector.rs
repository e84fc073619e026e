//! Comparisons between a tree, the index, and the working tree.

use knot_index::{FileStat, Index, IndexEntry};
use knot_store::{Blob, Database, Entry};

use crate::error::WorkspaceResult;
use crate::workspace::Workspace;

/// How one side differs from the other for a single path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
    Untracked,
}

pub struct Inspector<'a> {
    workspace: &'a dyn Workspace,
    index: &'a Index,
    db: &'a Database,
}

impl<'a> Inspector<'a> {
    pub fn new(workspace: &'a dyn Workspace, index: &'a Index, db: &'a Database) -> Self {
        Self {
            workspace,
            index,
            db,
        }
    }

    /// An untracked file, or a directory containing one at any depth.
    pub fn trackable_file(&self, path: &str, stat: Option<&FileStat>) -> WorkspaceResult<bool> {
        let Some(stat) = stat else {
            return Ok(false);
        };
        if stat.is_file() {
            return Ok(!self.index.tracked_file(path));
        }
        if !stat.is_dir() {
            return Ok(false);
        }

        let items = self.workspace.list_dir(Some(path))?;
        let files = items.iter().filter(|(_, s)| s.is_file());
        let dirs = items.iter().filter(|(_, s)| s.is_dir());
        for (item_path, item_stat) in files.chain(dirs) {
            if self.trackable_file(item_path, Some(item_stat))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Compare a stage-0 entry with the file on disk. Cached stat data is
    /// trusted when it matches; otherwise the content is rehashed.
    pub fn compare_index_to_workspace(
        &self,
        entry: Option<&IndexEntry>,
        stat: Option<&FileStat>,
    ) -> WorkspaceResult<Option<ChangeType>> {
        let Some(entry) = entry else {
            return Ok(Some(ChangeType::Untracked));
        };
        let Some(stat) = stat else {
            return Ok(Some(ChangeType::Deleted));
        };
        if !entry.stat_match(stat) {
            return Ok(Some(ChangeType::Modified));
        }
        if entry.times_match(stat) {
            return Ok(None);
        }

        let data = self.workspace.read_file(&entry.path)?;
        let oid = self.db.hash_object(&Blob::new(data).into());
        Ok((oid != entry.oid).then_some(ChangeType::Modified))
    }

    /// Compare a tree entry with an index entry for the same path.
    pub fn compare_tree_to_index(
        &self,
        item: Option<&Entry>,
        entry: Option<&IndexEntry>,
    ) -> Option<ChangeType> {
        match (item, entry) {
            (None, None) => None,
            (None, Some(_)) => Some(ChangeType::Added),
            (Some(_), None) => Some(ChangeType::Deleted),
            (Some(item), Some(entry)) => {
                let differs = entry.mode != item.mode.mode_bits() || entry.oid != item.object_id;
                differs.then_some(ChangeType::Modified)
            }
        }
    }
}
