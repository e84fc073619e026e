//! File-backed refs in the `.git` layout.
//!
//! Every ref is a small text file holding either a hex oid or
//! `ref: <path>`. Updates go through a [`Lockfile`] so a concurrent writer
//! fails fast instead of interleaving.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use knot_types::{LockError, Lockfile, ObjectId};
use tracing::debug;

use crate::error::{RefError, Result};
use crate::names::validate_branch_name;
use crate::types::{RefValue, SymRef, HEAD, HEADS_DIR, REFS_DIR, REMOTES_DIR};

/// Symbolic refs followed before a chain is treated as corrupt.
const MAX_SYMREF_DEPTH: usize = 5;

#[derive(Clone, Debug)]
pub struct Refs {
    root: PathBuf,
}

impl Refs {
    /// Refs rooted at the repository directory (usually `.git`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn heads_path(&self) -> PathBuf {
        self.root.join(HEADS_DIR)
    }

    /// Create the `refs/heads` directory.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.heads_path())?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reading
    // ---------------------------------------------------------------

    pub fn read_head(&self) -> Result<Option<ObjectId>> {
        self.read_symref(&self.root.join(HEAD))
    }

    /// Resolve a short or full ref name, searching the repository directory,
    /// `refs/`, `refs/heads/` and `refs/remotes/` in that order.
    pub fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        match self.path_for_name(name) {
            Some(path) => self.read_symref(&path),
            None => Ok(None),
        }
    }

    /// Follow symrefs from `source` to the last ref in the chain: the branch
    /// HEAD points at, or HEAD itself when detached.
    pub fn current_ref(&self) -> Result<SymRef> {
        self.current_ref_from(HEAD)
    }

    fn current_ref_from(&self, source: &str) -> Result<SymRef> {
        let mut source = source.to_string();
        for _ in 0..=MAX_SYMREF_DEPTH {
            let path = self.root.join(&source);
            match self.read_value(&path)? {
                Some(RefValue::Symbolic(target)) => source = target,
                _ => return Ok(SymRef::new(source)),
            }
        }
        Err(too_deep(&self.root.join(source)))
    }

    /// The oid a named ref resolves to.
    pub fn read_oid(&self, symref: &SymRef) -> Result<Option<ObjectId>> {
        self.read_ref(&symref.path)
    }

    fn path_for_name(&self, name: &str) -> Option<PathBuf> {
        [
            self.root.clone(),
            self.root.join(REFS_DIR),
            self.root.join(HEADS_DIR),
            self.root.join(REMOTES_DIR),
        ]
        .into_iter()
        .map(|prefix| prefix.join(name))
        .find(|path| path.is_file())
    }

    fn read_value(&self, path: &Path) -> Result<Option<RefValue>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        RefValue::parse(&content)
            .map(Some)
            .ok_or_else(|| RefError::Corrupt {
                path: path.display().to_string(),
                content: content.trim().to_string(),
            })
    }

    fn read_symref(&self, path: &Path) -> Result<Option<ObjectId>> {
        let mut path = path.to_path_buf();
        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.read_value(&path)? {
                Some(RefValue::Symbolic(target)) => path = self.root.join(target),
                Some(RefValue::Direct(oid)) => return Ok(Some(oid)),
                None => return Ok(None),
            }
        }
        Err(too_deep(&path))
    }

    // ---------------------------------------------------------------
    // Writing
    // ---------------------------------------------------------------

    /// Point the ref HEAD ultimately resolves to at `oid`, returning the
    /// previous value. A detached HEAD is rewritten in place.
    pub fn update_head(&self, oid: &ObjectId) -> Result<Option<ObjectId>> {
        self.update_symref(&self.root.join(HEAD), oid, 0)
    }

    /// Point an unborn HEAD at `branch`. An existing HEAD is left alone.
    pub fn init_head(&self, branch: &str) -> Result<()> {
        let head = self.root.join(HEAD);
        if head.exists() {
            return Ok(());
        }
        self.update_ref_file(&head, &RefValue::Symbolic(format!("{HEADS_DIR}/{branch}")))
    }

    /// Switch HEAD: to a symref when `revision` names a branch, otherwise
    /// detach it at `oid`.
    pub fn set_head(&self, revision: &str, oid: &ObjectId) -> Result<()> {
        let head = self.root.join(HEAD);
        let branch = self.heads_path().join(revision);
        let value = if branch.is_file() {
            RefValue::Symbolic(format!("{HEADS_DIR}/{revision}"))
        } else {
            RefValue::Direct(*oid)
        };
        self.update_ref_file(&head, &value)
    }

    /// Write `oid` directly into the ref at `name` (relative to the
    /// repository directory), e.g. `ORIG_HEAD`.
    pub fn update_ref(&self, name: &str, oid: &ObjectId) -> Result<()> {
        self.update_ref_file(&self.root.join(name), &RefValue::Direct(*oid))
    }

    pub fn create_branch(&self, name: &str, start: &ObjectId) -> Result<()> {
        validate_branch_name(name)?;
        let path = self.heads_path().join(name);
        if path.exists() {
            return Err(RefError::AlreadyExists {
                name: name.to_string(),
            });
        }
        self.update_ref_file(&path, &RefValue::Direct(*start))?;
        debug!(branch = name, start = %start.short_hex(), "branch created");
        Ok(())
    }

    /// Delete a branch and any directories it leaves empty, returning the
    /// oid it pointed at.
    pub fn delete_branch(&self, name: &str) -> Result<ObjectId> {
        let path = self.heads_path().join(name);
        let mut lockfile = Lockfile::new(&path);
        lockfile.hold_for_update()?;

        let oid = self.read_symref(&path)?.ok_or_else(|| RefError::NotFound {
            name: name.to_string(),
        })?;
        fs::remove_file(&path)?;
        lockfile.rollback()?;
        self.delete_parent_directories(&path)?;
        debug!(branch = name, "branch deleted");
        Ok(oid)
    }

    fn delete_parent_directories(&self, path: &Path) -> Result<()> {
        let heads = self.heads_path();
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == heads || !current.starts_with(&heads) {
                break;
            }
            match fs::remove_dir(current) {
                Ok(()) => dir = current.parent(),
                Err(e) if e.kind() == ErrorKind::NotFound => dir = current.parent(),
                Err(_) => break,
            }
        }
        Ok(())
    }

    fn update_ref_file(&self, path: &Path, value: &RefValue) -> Result<()> {
        let mut lockfile = Lockfile::new(path);
        match lockfile.hold_for_update() {
            Err(LockError::MissingParent(_)) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                lockfile.hold_for_update()?;
            }
            other => other?,
        }
        lockfile.write(format!("{value}\n").as_bytes())?;
        lockfile.commit()?;
        Ok(())
    }

    fn update_symref(&self, path: &Path, oid: &ObjectId, depth: usize) -> Result<Option<ObjectId>> {
        if depth > MAX_SYMREF_DEPTH {
            return Err(too_deep(path));
        }
        let mut lockfile = Lockfile::new(path);
        lockfile.hold_for_update()?;

        match self.read_value(path)? {
            Some(RefValue::Symbolic(target)) => {
                lockfile.rollback()?;
                self.update_symref(&self.root.join(target), oid, depth + 1)
            }
            previous => {
                lockfile.write(format!("{}\n", RefValue::Direct(*oid)).as_bytes())?;
                lockfile.commit()?;
                Ok(previous.and_then(|value| match value {
                    RefValue::Direct(oid) => Some(oid),
                    RefValue::Symbolic(_) => None,
                }))
            }
        }
    }

    // ---------------------------------------------------------------
    // Listing
    // ---------------------------------------------------------------

    pub fn list_branches(&self) -> Result<Vec<SymRef>> {
        self.list_refs(&self.heads_path())
    }

    /// HEAD followed by every ref under `refs/`.
    pub fn list_all_refs(&self) -> Result<Vec<SymRef>> {
        let mut refs = vec![SymRef::new(HEAD)];
        refs.extend(self.list_refs(&self.root.join(REFS_DIR))?);
        Ok(refs)
    }

    /// Map from oid to every ref currently pointing at it.
    pub fn reverse_refs(&self) -> Result<HashMap<ObjectId, Vec<SymRef>>> {
        let mut table: HashMap<ObjectId, Vec<SymRef>> = HashMap::new();
        for symref in self.list_all_refs()? {
            if let Some(oid) = self.read_oid(&symref)? {
                table.entry(oid).or_default().push(symref);
            }
        }
        Ok(table)
    }

    fn list_refs(&self, dir: &Path) -> Result<Vec<SymRef>> {
        let read = match fs::read_dir(dir) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut children: Vec<PathBuf> = read
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        children.sort();

        let mut refs = Vec::new();
        for path in children {
            if path.is_dir() {
                refs.extend(self.list_refs(&path)?);
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                refs.push(SymRef::new(relative_name(relative)));
            }
        }
        Ok(refs)
    }

    /// Human-facing name of a ref path: `refs/heads/master` is `master`,
    /// `refs/remotes/origin/master` is `origin/master`.
    pub fn short_name(&self, path: &str) -> String {
        for prefix in [REMOTES_DIR, HEADS_DIR] {
            if let Some(rest) = path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                return rest.to_string();
            }
        }
        path.to_string()
    }
}

fn relative_name(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn too_deep(path: &Path) -> RefError {
    RefError::Corrupt {
        path: path.display().to_string(),
        content: format!("symbolic ref chain longer than {MAX_SYMREF_DEPTH}"),
    }
}
