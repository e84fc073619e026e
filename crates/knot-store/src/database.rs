use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use knot_types::ObjectId;

use crate::commit::Commit;
use crate::error::{StoreError, StoreResult};
use crate::file::FileObjectStore;
use crate::memory::InMemoryObjectStore;
use crate::object::{Blob, Object, ObjectKind, StoredObject};
use crate::traits::ObjectStore;
use crate::tree::{Entry, Tree};

/// Typed access to the object store.
///
/// Serializes and parses the closed [`Object`] union on top of any
/// [`ObjectStore`] backend. Parsed objects are cached for the lifetime of
/// this handle; the cache is never shared between handles.
pub struct Database {
    backend: Box<dyn ObjectStore>,
    cache: RefCell<HashMap<ObjectId, Object>>,
}

impl Database {
    pub fn new(backend: Box<dyn ObjectStore>) -> Self {
        Self {
            backend,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Open the loose-object directory at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(FileObjectStore::new(path)))
    }

    /// A database backed by memory only.
    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryObjectStore::new()))
    }

    /// Serialize, hash and persist `object`, returning its id.
    pub fn store(&self, object: &Object) -> StoreResult<ObjectId> {
        self.backend.write(&object.to_stored_object())
    }

    /// The id `object` would be stored under, without writing it.
    pub fn hash_object(&self, object: &Object) -> ObjectId {
        object.to_stored_object().compute_id()
    }

    pub fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        self.backend.exists(id)
    }

    /// Load and parse an object, consulting the cache first.
    pub fn load(&self, id: &ObjectId) -> StoreResult<Object> {
        if let Some(object) = self.cache.borrow().get(id) {
            return Ok(object.clone());
        }
        let stored = self.load_raw(id)?;
        let object = Object::from_stored_object(id, &stored)?;
        self.cache.borrow_mut().insert(*id, object.clone());
        Ok(object)
    }

    /// The unparsed payload of an object.
    pub fn load_raw(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.backend
            .read(id)?
            .ok_or(StoreError::ObjectNotFound(*id))
    }

    pub fn load_blob(&self, id: &ObjectId) -> StoreResult<Blob> {
        match self.load(id)? {
            Object::Blob(blob) => Ok(blob),
            other => Err(unexpected(id, ObjectKind::Blob, &other)),
        }
    }

    pub fn load_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        match self.load(id)? {
            Object::Tree(tree) => Ok(tree),
            other => Err(unexpected(id, ObjectKind::Tree, &other)),
        }
    }

    pub fn load_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
        match self.load(id)? {
            Object::Commit(commit) => Ok(commit),
            other => Err(unexpected(id, ObjectKind::Commit, &other)),
        }
    }

    /// Resolve a commit or tree id to the id of its root tree.
    pub fn root_tree(&self, id: &ObjectId) -> StoreResult<ObjectId> {
        match self.load(id)? {
            Object::Commit(commit) => Ok(commit.tree),
            Object::Tree(_) => Ok(*id),
            other => Err(unexpected(id, ObjectKind::Tree, &other)),
        }
    }

    /// Directory entry for a root tree.
    pub fn tree_entry(&self, id: &ObjectId) -> Entry {
        Entry::tree(*id)
    }

    /// Entry at `path` inside the tree of commit (or tree) `id`; the root
    /// tree itself when `path` is `None`.
    pub fn load_tree_entry(&self, id: &ObjectId, path: Option<&str>) -> StoreResult<Option<Entry>> {
        let root = Entry::tree(self.root_tree(id)?);
        let Some(path) = path else {
            return Ok(Some(root));
        };

        let mut current = Some(root);
        for name in path.split('/').filter(|s| !s.is_empty()) {
            current = match current {
                Some(entry) if entry.is_tree() => self
                    .load_tree(&entry.object_id)?
                    .get(name)
                    .map(|e| e.entry()),
                _ => None,
            };
        }
        Ok(current)
    }

    /// Flatten the tree of `id` (optionally below `path`) into leaf entries
    /// keyed by their full path.
    pub fn load_tree_list(
        &self,
        id: Option<&ObjectId>,
        path: Option<&str>,
    ) -> StoreResult<BTreeMap<String, Entry>> {
        let mut list = BTreeMap::new();
        let Some(id) = id else {
            return Ok(list);
        };
        if let Some(entry) = self.load_tree_entry(id, path)? {
            self.build_list(&mut list, entry, path.unwrap_or("").to_string())?;
        }
        Ok(list)
    }

    fn build_list(&self, list: &mut BTreeMap<String, Entry>, entry: Entry, prefix: String) -> StoreResult<()> {
        if !entry.is_tree() {
            list.insert(prefix, entry);
            return Ok(());
        }
        for child in self.load_tree(&entry.object_id)?.entries {
            let path = if prefix.is_empty() {
                child.name.clone()
            } else {
                format!("{prefix}/{}", child.name)
            };
            self.build_list(list, child.entry(), path)?;
        }
        Ok(())
    }

    /// The abbreviated form of an id shown to users.
    pub fn short_oid(&self, id: &ObjectId) -> String {
        id.short_hex()
    }

    /// All ids starting with the hex `prefix`.
    pub fn prefix_match(&self, prefix: &str) -> StoreResult<Vec<ObjectId>> {
        self.backend.prefix_match(&prefix.to_ascii_lowercase())
    }

    /// Number of parsed objects currently cached.
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("cached", &self.cached())
            .finish_non_exhaustive()
    }
}

fn unexpected(id: &ObjectId, expected: ObjectKind, actual: &Object) -> StoreError {
    StoreError::UnexpectedKind {
        id: *id,
        expected,
        actual: actual.kind(),
    }
}
