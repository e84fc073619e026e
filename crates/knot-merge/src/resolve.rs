//! Tree-level merge of two commits.
//!
//! Both sides are diffed against the merge base. Paths changed on one side
//! only are taken from that side. Paths changed on both are merged: content
//! through [`diff3`](crate::diff3) and mode bits by the same three-way rule.
//! The clean result is applied to the working tree through a [`Migration`];
//! every unresolved path is then recorded in the index at stages 1 to 3.
//! When a file on one side sits where the other side has a directory, the
//! file is moved aside to `<path>~<branch>` in the working tree.

use std::collections::BTreeMap;

use knot_diff::{tree_diff, TreeChanges};
use knot_index::Index;
use knot_store::{Blob, Database, Entry, EntryMode};
use knot_types::ObjectId;
use knot_workspace::{Migration, Workspace};
use tracing::{info, warn};

use crate::diff3;
use crate::error::MergeResult;
use crate::inputs::Inputs;

type Progress<'a> = Box<dyn FnMut(&str) + 'a>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

pub struct Resolve<'a> {
    db: &'a Database,
    workspace: &'a dyn Workspace,
    index: &'a mut Index,
    inputs: &'a Inputs,
    on_progress: Option<Progress<'a>>,
    label_conflicts: bool,
    left_diff: TreeChanges,
    right_diff: TreeChanges,
    clean_diff: TreeChanges,
    conflicts: BTreeMap<String, [Option<Entry>; 3]>,
    untracked: BTreeMap<String, Entry>,
}

impl<'a> Resolve<'a> {
    pub fn new(
        db: &'a Database,
        workspace: &'a dyn Workspace,
        index: &'a mut Index,
        inputs: &'a Inputs,
    ) -> Self {
        Self {
            db,
            workspace,
            index,
            inputs,
            on_progress: None,
            label_conflicts: true,
            left_diff: TreeChanges::new(),
            right_diff: TreeChanges::new(),
            clean_diff: TreeChanges::new(),
            conflicts: BTreeMap::new(),
            untracked: BTreeMap::new(),
        }
    }

    /// Receive each progress and conflict message as it is produced.
    pub fn on_progress(&mut self, callback: impl FnMut(&str) + 'a) {
        self.on_progress = Some(Box::new(callback));
    }

    /// Whether conflict markers carry the side names. On by default.
    pub fn label_conflicts(&mut self, on: bool) {
        self.label_conflicts = on;
    }

    /// Merge the right side into the working tree and index, which must be
    /// at the left side. Conflicts are left in the index; callers check
    /// [`Index::conflict`] afterwards.
    pub fn execute(&mut self) -> MergeResult<()> {
        self.prepare_tree_diffs()?;

        let mut migration = Migration::new(self.clean_diff.clone());
        migration.apply_changes(self.workspace, &mut *self.index, self.db)?;

        self.add_conflicts_to_index();
        self.write_untracked_files()
    }

    /// Unresolved paths with their base, left and right entries.
    pub fn conflicts(&self) -> &BTreeMap<String, [Option<Entry>; 3]> {
        &self.conflicts
    }

    fn prepare_tree_diffs(&mut self) -> MergeResult<()> {
        let base = self.inputs.base_oids.first();
        self.left_diff = tree_diff::<&str>(self.db, base, Some(&self.inputs.left_oid), &[])?;
        self.right_diff = tree_diff::<&str>(self.db, base, Some(&self.inputs.right_oid), &[])?;
        self.clean_diff.clear();
        self.conflicts.clear();
        self.untracked.clear();

        let right_changes: Vec<(String, Option<Entry>, Option<Entry>)> = self
            .right_diff
            .iter()
            .map(|(path, (old_item, new_item))| (path.clone(), *old_item, *new_item))
            .collect();
        for (path, old_item, new_item) in right_changes {
            if new_item.is_some() {
                self.file_dir_conflict(&path, Side::Left);
            }
            self.same_path_conflict(&path, old_item, new_item)?;
        }

        let left_added: Vec<String> = self
            .left_diff
            .iter()
            .filter(|(_, (_, new_item))| new_item.is_some())
            .map(|(path, _)| path.clone())
            .collect();
        for path in left_added {
            self.file_dir_conflict(&path, Side::Right);
        }
        Ok(())
    }

    fn same_path_conflict(
        &mut self,
        path: &str,
        base: Option<Entry>,
        right: Option<Entry>,
    ) -> MergeResult<()> {
        let Some(&(_, left)) = self.left_diff.get(path) else {
            self.clean_diff.insert(path.to_string(), (base, right));
            return Ok(());
        };
        if left == right {
            return Ok(());
        }
        if left.is_some() && right.is_some() {
            self.log(format!("Auto-merging {path}"));
        }

        let (oid_ok, oid) = self.merge_blobs(
            base.map(|e| e.object_id),
            left.map(|e| e.object_id),
            right.map(|e| e.object_id),
        )?;
        let (mode_ok, mode) = merge_modes(
            base.map(|e| e.mode),
            left.map(|e| e.mode),
            right.map(|e| e.mode),
        );

        if let (Some(oid), Some(mode)) = (oid, mode) {
            let merged = Entry::new(mode, oid);
            if left != Some(merged) {
                self.clean_diff.insert(path.to_string(), (left, Some(merged)));
            }
        }
        if oid_ok && mode_ok {
            return Ok(());
        }

        self.conflicts.insert(path.to_string(), [base, left, right]);
        self.log_conflict(path, None);
        Ok(())
    }

    fn merge_blobs(
        &self,
        base: Option<ObjectId>,
        left: Option<ObjectId>,
        right: Option<ObjectId>,
    ) -> MergeResult<(bool, Option<ObjectId>)> {
        if let Some(result) = merge3(base, left, right) {
            return Ok(result);
        }

        let text = |oid: Option<ObjectId>| -> MergeResult<String> {
            match oid {
                Some(oid) => Ok(self.db.load_blob(&oid)?.text()),
                None => Ok(String::new()),
            }
        };
        let result = diff3::merge(&text(base)?, &text(left)?, &text(right)?);
        let data = if self.label_conflicts {
            result.to_text(Some(&self.inputs.left_name), Some(&self.inputs.right_name))
        } else {
            result.to_string()
        };
        let oid = self.db.store(&Blob::new(data).into())?;
        Ok((result.clean(), Some(oid)))
    }

    /// A file added on one side lies below a path the `other` side added
    /// as a file: move that file aside and record the conflict.
    fn file_dir_conflict(&mut self, path: &str, other: Side) {
        let inputs = self.inputs;
        let (diff, name) = match other {
            Side::Left => (&self.left_diff, &inputs.left_name),
            Side::Right => (&self.right_diff, &inputs.right_name),
        };
        let hits: Vec<(String, Option<Entry>, Entry)> = ancestors(path)
            .into_iter()
            .rev()
            .filter_map(|parent| match diff.get(&parent) {
                Some(&(old_item, Some(new_item))) => Some((parent, old_item, new_item)),
                _ => None,
            })
            .collect();

        for (parent, old_item, new_item) in hits {
            let items = match other {
                Side::Left => [old_item, Some(new_item), None],
                Side::Right => [old_item, None, Some(new_item)],
            };
            self.conflicts.insert(parent.clone(), items);
            self.clean_diff.remove(&parent);

            let rename = format!("{parent}~{name}");
            self.untracked.insert(rename.clone(), new_item);
            self.log_conflict(&parent, Some(&rename));
        }
    }

    fn add_conflicts_to_index(&mut self) {
        for (path, items) in &self.conflicts {
            self.index.add_conflict_set(path, *items);
        }
    }

    fn write_untracked_files(&self) -> MergeResult<()> {
        for (path, item) in &self.untracked {
            let blob = self.db.load_blob(&item.object_id)?;
            self.workspace.write_file(path, &blob.data, Some(item.mode), true)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reporting
    // ---------------------------------------------------------------

    fn log(&mut self, message: String) {
        info!("{message}");
        if let Some(callback) = self.on_progress.as_mut() {
            callback(&message);
        }
    }

    fn log_conflict(&mut self, path: &str, rename: Option<&str>) {
        let Some(&[base, left, right]) = self.conflicts.get(path) else {
            return;
        };
        warn!(path, "merge conflict");

        let message = if left.is_some() && right.is_some() {
            let kind = if base.is_some() { "content" } else { "add/add" };
            format!("CONFLICT ({kind}): Merge conflict in {path}")
        } else if base.is_some() {
            let (deleted, modified) = self.branch_names(left.is_some());
            let at = rename.map(|r| format!(" at {r}")).unwrap_or_default();
            format!(
                "CONFLICT (modify/delete): {path} deleted in {deleted} and modified in \
                 {modified}. Version {modified} of {path} left in tree{at}."
            )
        } else {
            let kind = if left.is_some() {
                "file/directory"
            } else {
                "directory/file"
            };
            let (branch, _) = self.branch_names(left.is_some());
            format!(
                "CONFLICT ({kind}): There is a directory with name {path} in {branch}. \
                 Adding {path} as {}",
                rename.unwrap_or(path)
            )
        };
        self.log(message);
    }

    /// The side without the entry first, then the side that has it.
    fn branch_names(&self, left_has_entry: bool) -> (String, String) {
        let left = self.inputs.left_name.clone();
        let right = self.inputs.right_name.clone();
        if left_has_entry {
            (right, left)
        } else {
            (left, right)
        }
    }
}

/// Generic three-way rule: a missing side loses, an unchanged side defers
/// to the other, and agreement is clean. `None` means both sides changed
/// differently.
fn merge3<T: PartialEq + Copy>(
    base: Option<T>,
    left: Option<T>,
    right: Option<T>,
) -> Option<(bool, Option<T>)> {
    if left.is_none() {
        return Some((false, right));
    }
    if right.is_none() {
        return Some((false, left));
    }
    if left == base || left == right {
        Some((true, right))
    } else if right == base {
        Some((true, left))
    } else {
        None
    }
}

fn merge_modes(
    base: Option<EntryMode>,
    left: Option<EntryMode>,
    right: Option<EntryMode>,
) -> (bool, Option<EntryMode>) {
    merge3(base, left, right).unwrap_or((false, left))
}

/// Proper ancestor directories, shallowest first.
fn ancestors(path: &str) -> Vec<String> {
    path.match_indices('/')
        .map(|(i, _)| path[..i].to_string())
        .collect()
}
