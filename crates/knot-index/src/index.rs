//! The staging index: the persistent snapshot the next commit is built from.
//!
//! Entries are keyed by `(path, stage)`. Stage 0 is a normal entry; stages
//! 1, 2 and 3 hold the base, ours and theirs sides of an unmerged path. A
//! path never carries a stage-0 entry alongside conflict stages.
//!
//! `parents` maps every tracked directory to the set of tracked paths below
//! it, which keeps file/directory replacement and `tracked_directory`
//! lookups cheap.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use knot_store::{Database, Entry, Tree, TreeBuilder};
use knot_types::{Lockfile, ObjectId};
use tracing::debug;

use crate::checksum::{ChecksumReader, ChecksumWriter};
use crate::entry::{FileStat, IndexEntry, ENTRY_BLOCK, ENTRY_MIN_SIZE};
use crate::error::{IndexError, IndexResult};

pub const SIGNATURE: &[u8; 4] = b"DIRC";
pub const VERSION: u32 = 2;
const HEADER_SIZE: usize = 12;

pub struct Index {
    path: PathBuf,
    lockfile: Lockfile,
    entries: BTreeMap<(String, u8), IndexEntry>,
    parents: BTreeMap<String, BTreeSet<String>>,
    changed: bool,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .field("changed", &self.changed)
            .finish()
    }
}

impl Index {
    /// An index backed by the file at `path`. Nothing is read until
    /// [`load`](Index::load) or [`load_for_update`](Index::load_for_update).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            lockfile: Lockfile::new(&path),
            path,
            entries: BTreeMap::new(),
            parents: BTreeMap::new(),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.parents.clear();
        self.changed = false;
    }

    // ---------------------------------------------------------------
    // Loading and saving
    // ---------------------------------------------------------------

    /// Take the index lock, then load.
    pub fn load_for_update(&mut self) -> IndexResult<()> {
        self.lockfile.hold_for_update()?;
        self.load()
    }

    /// Read and verify the index file. A missing file is an empty index.
    pub fn load(&mut self) -> IndexResult<()> {
        self.clear();
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = ChecksumReader::new(&data);
        let count = read_header(&mut reader)?;
        for _ in 0..count {
            let entry = read_entry(&mut reader)?;
            self.store_entry(entry);
        }
        reader.verify_checksum()?;
        debug!(path = %self.path.display(), entries = count, "index loaded");
        Ok(())
    }

    /// Persist pending changes and release the lock. When nothing changed,
    /// the lock is rolled back and the file is left untouched.
    pub fn write_updates(&mut self) -> IndexResult<()> {
        if !self.changed {
            self.lockfile.rollback()?;
            return Ok(());
        }

        let mut writer = ChecksumWriter::new();
        writer.write(SIGNATURE);
        writer.write(&VERSION.to_be_bytes());
        writer.write(&(self.entries.len() as u32).to_be_bytes());
        for entry in self.entries.values() {
            writer.write(&entry.to_bytes());
        }

        self.lockfile.write(&writer.finish())?;
        self.lockfile.commit()?;
        self.changed = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "index written");
        Ok(())
    }

    pub fn release_lock(&mut self) -> IndexResult<()> {
        self.lockfile.rollback()?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Stage a working-tree file at stage 0, replacing any conflict stages,
    /// any tracked parent directory entry, and anything tracked below it.
    pub fn add(&mut self, path: &str, oid: ObjectId, stat: &FileStat) {
        for stage in 1..=3 {
            self.remove_entry_with_stage(path, stage);
        }
        let entry = IndexEntry::new(path, oid, stat);
        self.discard_conflicts(&entry);
        self.store_entry(entry);
        self.changed = true;
    }

    /// Stage a tree entry at stage 0 with zeroed metadata.
    pub fn add_from_db(&mut self, path: &str, item: &Entry) {
        self.store_entry(IndexEntry::from_db(path, item, 0));
        self.changed = true;
    }

    /// Record an unmerged path: one entry per present side at stages 1..=3.
    pub fn add_conflict_set(&mut self, path: &str, items: [Option<Entry>; 3]) {
        self.remove_entry_with_stage(path, 0);
        for (n, item) in items.iter().enumerate() {
            if let Some(item) = item {
                self.store_entry(IndexEntry::from_db(path, item, n as u8 + 1));
            }
        }
        self.changed = true;
    }

    /// Remove a path at every stage along with everything tracked below it.
    pub fn remove(&mut self, path: &str) {
        if let Some(children) = self.parents.get(path).cloned() {
            for child in children {
                self.remove_entry(&child);
            }
        }
        self.remove_entry(path);
        self.changed = true;
    }

    /// Refresh the cached metadata of the stage-0 entry for `path`.
    pub fn update_entry_stat(&mut self, path: &str, stat: &FileStat) {
        if let Some(entry) = self.entries.get_mut(&(path.to_string(), 0)) {
            entry.update_stat(stat);
            self.changed = true;
        }
    }

    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_directories() {
            self.remove_entry(&parent);
        }
        if let Some(children) = self.parents.get(&entry.path).cloned() {
            for child in children {
                self.remove_entry(&child);
            }
        }
    }

    fn remove_entry(&mut self, path: &str) {
        for stage in 0..=3 {
            self.remove_entry_with_stage(path, stage);
        }
    }

    fn remove_entry_with_stage(&mut self, path: &str, stage: u8) {
        let Some(entry) = self.entries.remove(&(path.to_string(), stage)) else {
            return;
        };
        if self.tracked_file(path) {
            return;
        }
        for dir in entry.parent_directories() {
            if let Some(children) = self.parents.get_mut(&dir) {
                children.remove(&entry.path);
                if children.is_empty() {
                    self.parents.remove(&dir);
                }
            }
        }
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        for dir in entry.parent_directories() {
            self.parents.entry(dir).or_default().insert(entry.path.clone());
        }
        self.entries.insert(entry.key(), entry);
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// All entries ordered by `(path, stage)`.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn entry_for_path(&self, path: &str, stage: u8) -> Option<&IndexEntry> {
        self.entries.get(&(path.to_string(), stage))
    }

    /// Tracked at any stage.
    pub fn tracked_file(&self, path: &str) -> bool {
        (0..=3).any(|stage| self.entries.contains_key(&(path.to_string(), stage)))
    }

    pub fn tracked_directory(&self, path: &str) -> bool {
        self.parents.contains_key(path)
    }

    pub fn tracked(&self, path: &str) -> bool {
        self.tracked_file(path) || self.tracked_directory(path)
    }

    /// Tracked paths below directory `path`.
    pub fn child_paths(&self, path: &str) -> Vec<String> {
        self.parents
            .get(path)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether any path is unmerged.
    pub fn conflict(&self) -> bool {
        self.entries.values().any(|e| e.stage() > 0)
    }

    pub fn conflict_paths(&self) -> Vec<String> {
        let paths: BTreeSet<&str> = self
            .entries
            .values()
            .filter(|e| e.stage() > 0)
            .map(|e| e.path.as_str())
            .collect();
        paths.into_iter().map(String::from).collect()
    }

    // ---------------------------------------------------------------
    // Tree building
    // ---------------------------------------------------------------

    /// Store the tree for all stage-0 entries, children before parents.
    pub fn write_tree(&self, db: &Database) -> IndexResult<ObjectId> {
        if self.conflict() {
            return Err(IndexError::Conflict(self.conflict_paths()));
        }
        let mut builder = TreeBuilder::new();
        for entry in self.entries.values() {
            builder.add(&entry.path, entry.to_tree_entry());
        }
        let root = builder.build(&mut |tree: Tree| db.store(&tree.into()))?;
        debug!(tree = %root.short_hex(), "tree written from index");
        Ok(root)
    }
}

fn read_header(reader: &mut ChecksumReader<'_>) -> IndexResult<u32> {
    let header = reader.read(HEADER_SIZE)?;
    let signature = &header[0..4];
    if signature != SIGNATURE {
        return Err(IndexError::CorruptIndex(format!(
            "Signature: expected {} but found {}",
            String::from_utf8_lossy(SIGNATURE),
            String::from_utf8_lossy(signature)
        )));
    }
    let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if version != VERSION {
        return Err(IndexError::CorruptIndex(format!(
            "Version: expected {VERSION} but found {version}"
        )));
    }
    Ok(u32::from_be_bytes([header[8], header[9], header[10], header[11]]))
}

fn read_entry(reader: &mut ChecksumReader<'_>) -> IndexResult<IndexEntry> {
    let mut block = reader.read(ENTRY_MIN_SIZE)?.to_vec();
    while block.last() != Some(&0) {
        block.extend_from_slice(reader.read(ENTRY_BLOCK)?);
    }
    IndexEntry::parse(&block)
}
