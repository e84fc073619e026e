//! Working-tree access.
//!
//! The [`Workspace`] trait is the narrow interface the core uses to read and
//! write the checked-out files. [`FsWorkspace`] implements it over the local
//! filesystem, skipping the `.git` directory.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use knot_index::FileStat;
use knot_store::{Database, EntryMode};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::migration::Migration;

const IGNORE: &[&str] = &[".git"];

/// Working-tree file operations. Paths are relative to the workspace root
/// and use `/` as separator.
pub trait Workspace {
    /// Every file below `path` (or the whole tree), sorted.
    fn list_files(&self, path: Option<&str>) -> WorkspaceResult<Vec<String>>;

    /// Direct children of `dir` with their metadata.
    fn list_dir(&self, dir: Option<&str>) -> WorkspaceResult<BTreeMap<String, FileStat>>;

    fn read_file(&self, path: &str) -> WorkspaceResult<Vec<u8>>;

    /// Metadata for `path`, or `None` when it does not exist.
    fn stat_file(&self, path: &str) -> WorkspaceResult<Option<FileStat>>;

    fn write_file(
        &self,
        path: &str,
        data: &[u8],
        mode: Option<EntryMode>,
        mkdir: bool,
    ) -> WorkspaceResult<()>;

    /// Delete a file or directory tree, then any parents it leaves empty.
    fn remove(&self, path: &str) -> WorkspaceResult<()>;

    /// Delete a file or directory tree. Missing paths are ignored.
    fn rm_rf(&self, path: &str) -> WorkspaceResult<()>;

    /// Remove `dir` if it is an empty directory; otherwise do nothing.
    fn remove_directory(&self, dir: &str) -> WorkspaceResult<()>;

    /// Ensure `dir` is a directory, replacing a file of the same name.
    fn make_directory(&self, dir: &str) -> WorkspaceResult<()>;

    /// Carry out a planned migration: deletions, then directory removal
    /// deepest first, directory creation, updates and finally creations.
    fn apply_migration(&self, migration: &Migration, db: &Database) -> WorkspaceResult<()> {
        for path in &migration.changes.delete {
            self.rm_rf(path)?;
        }
        for dir in migration.rmdirs.iter().rev() {
            self.remove_directory(dir)?;
        }
        for dir in &migration.mkdirs {
            self.make_directory(dir)?;
        }
        for (path, entry) in migration.changes.update.iter().chain(&migration.changes.create) {
            self.rm_rf(path)?;
            let blob = db.load_blob(&entry.object_id)?;
            self.write_file(path, &blob.data, Some(entry.mode), false)?;
        }
        Ok(())
    }
}

/// [`Workspace`] over a directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct FsWorkspace {
    root: PathBuf,
}

impl FsWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn permission_error(op: &'static str, path: &str, err: std::io::Error) -> WorkspaceError {
    if err.kind() == ErrorKind::PermissionDenied {
        WorkspaceError::NoPermission {
            op,
            path: path.to_string(),
        }
    } else {
        err.into()
    }
}

impl Workspace for FsWorkspace {
    fn list_files(&self, path: Option<&str>) -> WorkspaceResult<Vec<String>> {
        let rel = path.unwrap_or("");
        let start = self.full_path(rel);
        if !start.exists() {
            return Err(WorkspaceError::MissingFile(rel.to_string()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&start)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || e.file_name().to_str().map_or(true, |n| !IGNORE.contains(&n))
            });
        for entry in walker {
            let entry = entry.map_err(|e| {
                let shown = e
                    .path()
                    .map(|p| self.relative(p))
                    .unwrap_or_else(|| rel.to_string());
                match e.into_io_error() {
                    Some(io) => permission_error("stat", &shown, io),
                    None => WorkspaceError::MissingFile(shown),
                }
            })?;
            if !entry.file_type().is_dir() {
                files.push(self.relative(entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    fn list_dir(&self, dir: Option<&str>) -> WorkspaceResult<BTreeMap<String, FileStat>> {
        let base = self.full_path(dir.unwrap_or(""));
        let mut stats = BTreeMap::new();
        for entry in fs::read_dir(&base)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if IGNORE.contains(&name.as_str()) {
                continue;
            }
            let path = entry.path();
            let meta = fs::metadata(&path)?;
            stats.insert(self.relative(&path), FileStat::from_metadata(&meta));
        }
        Ok(stats)
    }

    fn read_file(&self, path: &str) -> WorkspaceResult<Vec<u8>> {
        fs::read(self.full_path(path)).map_err(|e| permission_error("read", path, e))
    }

    fn stat_file(&self, path: &str) -> WorkspaceResult<Option<FileStat>> {
        match fs::metadata(self.full_path(path)) {
            Ok(meta) => Ok(Some(FileStat::from_metadata(&meta))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.raw_os_error() == Some(20) => Ok(None), // ENOTDIR
            Err(e) => Err(permission_error("stat", path, e)),
        }
    }

    fn write_file(
        &self,
        path: &str,
        data: &[u8],
        mode: Option<EntryMode>,
        mkdir: bool,
    ) -> WorkspaceResult<()> {
        let full = self.full_path(path);
        if mkdir {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&full, data)?;
        if let Some(mode) = mode {
            set_mode(&full, mode)?;
        }
        debug!(path, bytes = data.len(), "workspace file written");
        Ok(())
    }

    fn remove(&self, path: &str) -> WorkspaceResult<()> {
        self.rm_rf(path)?;
        let mut parent = Path::new(path).parent();
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.remove_directory(&dir.to_string_lossy())?;
            parent = dir.parent();
        }
        Ok(())
    }

    fn rm_rf(&self, path: &str) -> WorkspaceResult<()> {
        let full = self.full_path(path);
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&full)?,
            Ok(_) => fs::remove_file(&full)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn remove_directory(&self, dir: &str) -> WorkspaceResult<()> {
        let full = self.full_path(dir);
        match fs::remove_dir(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            // Not a directory, or not empty: leave it alone.
            Err(_) if !full.is_dir() || has_children(&full) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn make_directory(&self, dir: &str) -> WorkspaceResult<()> {
        let full = self.full_path(dir);
        match self.stat_file(dir)? {
            Some(stat) if stat.is_dir() => Ok(()),
            Some(_) => {
                fs::remove_file(&full)?;
                fs::create_dir(&full)?;
                Ok(())
            }
            None => {
                fs::create_dir(&full)?;
                Ok(())
            }
        }
    }
}

fn has_children(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: EntryMode) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = match mode {
        EntryMode::Executable => 0o755,
        _ => 0o644,
    };
    fs::set_permissions(path, fs::Permissions::from_mode(bits))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: EntryMode) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(files: &[(&str, &str)]) -> (TempDir, FsWorkspace) {
        let dir = TempDir::new().unwrap();
        let ws = FsWorkspace::new(dir.path());
        for (path, content) in files {
            ws.write_file(path, content.as_bytes(), None, true).unwrap();
        }
        (dir, ws)
    }

    #[test]
    fn list_files_skips_git_dir() {
        let (dir, ws) = setup(&[("a.txt", "a"), ("src/lib.rs", "b"), ("src/x/y.rs", "c")]);
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();

        assert_eq!(
            ws.list_files(None).unwrap(),
            vec!["a.txt", "src/lib.rs", "src/x/y.rs"]
        );
        assert_eq!(ws.list_files(Some("src/x")).unwrap(), vec!["src/x/y.rs"]);
        assert_eq!(ws.list_files(Some("a.txt")).unwrap(), vec!["a.txt"]);
    }

    #[test]
    fn list_files_reports_missing_pathspec() {
        let (_dir, ws) = setup(&[]);
        let err = ws.list_files(Some("nope")).unwrap_err();
        assert_eq!(err.to_string(), "pathspec 'nope' did not match any files");
    }

    #[test]
    fn list_dir_returns_direct_children() {
        let (_dir, ws) = setup(&[("a.txt", "a"), ("d/b.txt", "b")]);
        let entries = ws.list_dir(None).unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["a.txt", "d"]);
        assert!(entries["d"].is_dir());
        assert!(entries["a.txt"].is_file());
        assert_eq!(entries["a.txt"].size, 1);
        assert_eq!(ws.list_dir(Some("d")).unwrap().len(), 1);
    }

    #[test]
    fn stat_missing_is_none() {
        let (_dir, ws) = setup(&[("a.txt", "a")]);
        assert!(ws.stat_file("missing").unwrap().is_none());
        assert!(ws.stat_file("a.txt/below").unwrap().is_none());
    }

    #[test]
    fn remove_prunes_empty_parents() {
        let (dir, ws) = setup(&[("a/b/c.txt", "x"), ("a/keep.txt", "y")]);
        ws.remove("a/b/c.txt").unwrap();
        assert!(!dir.path().join("a/b").exists());
        assert!(dir.path().join("a/keep.txt").exists());
    }

    #[test]
    fn make_directory_replaces_file() {
        let (dir, ws) = setup(&[("x", "file")]);
        ws.make_directory("x").unwrap();
        assert!(dir.path().join("x").is_dir());
        ws.make_directory("x").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn write_file_sets_executable_mode() {
        let (_dir, ws) = setup(&[]);
        ws.write_file("run.sh", b"#!/bin/sh\n", Some(EntryMode::Executable), false)
            .unwrap();
        let stat = ws.stat_file("run.sh").unwrap().unwrap();
        assert_eq!(knot_index::mode_for_stat(&stat), EntryMode::Executable.mode_bits());
    }
}
