//! Working tree and index state relative to a commit.

use std::collections::{BTreeMap, BTreeSet};

use knot_index::{FileStat, Index};
use knot_store::{Database, Entry};
use knot_types::ObjectId;
use knot_workspace::{ChangeType, Inspector, Workspace};

use crate::error::RepoResult;

#[derive(Clone, Debug, Default)]
pub struct Status {
    /// Every path that differs anywhere, including unmerged ones.
    pub changed: BTreeSet<String>,
    /// Index against the commit tree.
    pub index_changes: BTreeMap<String, ChangeType>,
    /// Working tree against the index.
    pub workspace_changes: BTreeMap<String, ChangeType>,
    /// Untracked files; directories carry a trailing `/`.
    pub untracked: BTreeSet<String>,
    /// Stages present for each unmerged path.
    pub conflicts: BTreeMap<String, Vec<u8>>,
    /// Flattened tree of the commit compared against.
    pub head_tree: BTreeMap<String, Entry>,
    stats: BTreeMap<String, FileStat>,
}

impl Status {
    /// Compare the working tree and `index` with `commit`'s tree. Stat
    /// data of entries whose content turns out unchanged is refreshed in
    /// the index.
    pub fn new(
        workspace: &dyn Workspace,
        index: &mut Index,
        db: &Database,
        commit: Option<&ObjectId>,
    ) -> RepoResult<Self> {
        let mut status = Self {
            head_tree: db.load_tree_list(commit, None)?,
            ..Self::default()
        };

        let unchanged = {
            let inspector = Inspector::new(workspace, index, db);
            status.scan_workspace(&inspector, workspace, index, None)?;
            status.check_index_entries(&inspector, index)?
        };
        for (path, stat) in unchanged {
            index.update_entry_stat(&path, &stat);
        }
        status.collect_deleted_head_files(index);
        Ok(status)
    }

    fn scan_workspace(
        &mut self,
        inspector: &Inspector<'_>,
        workspace: &dyn Workspace,
        index: &Index,
        prefix: Option<&str>,
    ) -> RepoResult<()> {
        for (path, stat) in workspace.list_dir(prefix)? {
            if index.tracked(&path) {
                if stat.is_file() {
                    self.stats.insert(path.clone(), stat);
                }
                if stat.is_dir() {
                    self.scan_workspace(inspector, workspace, index, Some(&path))?;
                }
            } else if inspector.trackable_file(&path, Some(&stat))? {
                let shown = if stat.is_dir() { format!("{path}/") } else { path };
                self.untracked.insert(shown);
            }
        }
        Ok(())
    }

    /// Returns the stage-0 entries that match the working tree, with the
    /// stat to cache for them.
    fn check_index_entries(
        &mut self,
        inspector: &Inspector<'_>,
        index: &Index,
    ) -> RepoResult<Vec<(String, FileStat)>> {
        let mut unchanged = Vec::new();
        for entry in index.entries() {
            if entry.stage() > 0 {
                self.changed.insert(entry.path.clone());
                self.conflicts
                    .entry(entry.path.clone())
                    .or_default()
                    .push(entry.stage());
                continue;
            }

            let stat = self.stats.get(&entry.path).copied();
            match inspector.compare_index_to_workspace(Some(entry), stat.as_ref())? {
                Some(change) => self.record(&entry.path, change, Side::Workspace),
                None => {
                    if let Some(stat) = stat {
                        unchanged.push((entry.path.clone(), stat));
                    }
                }
            }

            let item = self.head_tree.get(&entry.path).copied();
            if let Some(change) = inspector.compare_tree_to_index(item.as_ref(), Some(entry)) {
                self.record(&entry.path, change, Side::Index);
            }
        }
        Ok(unchanged)
    }

    fn collect_deleted_head_files(&mut self, index: &Index) {
        let deleted: Vec<String> = self
            .head_tree
            .keys()
            .filter(|path| !index.tracked_file(path))
            .cloned()
            .collect();
        for path in deleted {
            self.record(&path, ChangeType::Deleted, Side::Index);
        }
    }

    fn record(&mut self, path: &str, change: ChangeType, side: Side) {
        self.changed.insert(path.to_string());
        let set = match side {
            Side::Index => &mut self.index_changes,
            Side::Workspace => &mut self.workspace_changes,
        };
        set.insert(path.to_string(), change);
    }

    pub fn is_clean(&self) -> bool {
        self.changed.is_empty() && self.untracked.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Side {
    Index,
    Workspace,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRepo;

    #[test]
    fn clean_after_commit() {
        let mut t = TestRepo::new();
        t.commit_file("a.txt", "one\n", "first");
        let status = t.repo.status().unwrap();
        assert!(status.is_clean());
        assert_eq!(status.head_tree.len(), 1);
    }

    #[test]
    fn reports_untracked_files_and_directories() {
        let mut t = TestRepo::new();
        t.commit_file("a.txt", "one\n", "first");
        t.write("new.txt", "x\n");
        t.write("dir/nested/file.txt", "y\n");
        std::fs::create_dir_all(t.root().join("empty")).unwrap();

        let status = t.repo.status().unwrap();
        let untracked: Vec<&str> = status.untracked.iter().map(String::as_str).collect();
        assert_eq!(untracked, vec!["dir/", "new.txt"]);
        assert!(status.changed.is_empty());
    }

    #[test]
    fn reports_workspace_and_index_changes() {
        let mut t = TestRepo::new();
        t.write("a.txt", "one\n");
        t.write("b.txt", "two\n");
        t.write("c.txt", "three\n");
        t.repo.add(&["."]).unwrap();
        t.repo.commit("first").unwrap();

        t.write("a.txt", "changed and longer\n");
        t.remove("b.txt");
        t.write("d.txt", "four\n");
        t.repo.add(&["d.txt"]).unwrap();
        t.repo.remove(&["c.txt"]).unwrap();

        let status = t.repo.status().unwrap();
        assert_eq!(status.workspace_changes.get("a.txt"), Some(&ChangeType::Modified));
        assert_eq!(status.workspace_changes.get("b.txt"), Some(&ChangeType::Deleted));
        assert_eq!(status.index_changes.get("c.txt"), Some(&ChangeType::Deleted));
        assert_eq!(status.index_changes.get("d.txt"), Some(&ChangeType::Added));
        assert_eq!(status.changed.len(), 4);
    }
}
