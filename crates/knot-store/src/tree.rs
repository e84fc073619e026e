use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use knot_types::{ObjectId, OID_BYTES};

use crate::error::{StoreError, StoreResult};

/// File mode for a tree or index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Subtree / directory (0o40000).
    Directory,
}

impl EntryMode {
    /// Octal mode value.
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Directory => 0o40000,
        }
    }

    /// Parse from an octal mode value.
    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o40000 => Some(Self::Directory),
            _ => None,
        }
    }

    /// Mode for a working-tree file: executable when every execute bit is set.
    pub fn for_permissions(permission_bits: u32) -> Self {
        if permission_bits & 0o111 == 0o111 {
            Self::Executable
        } else {
            Self::Regular
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", self.mode_bits())
    }
}

/// A nameless reference to an object as it appears inside a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Entry {
    pub mode: EntryMode,
    pub object_id: ObjectId,
}

impl Entry {
    pub fn new(mode: EntryMode, object_id: ObjectId) -> Self {
        Self { mode, object_id }
    }

    /// A directory reference, used for the root tree of a commit.
    pub fn tree(object_id: ObjectId) -> Self {
        Self::new(EntryMode::Directory, object_id)
    }

    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// File mode (regular, executable, directory).
    pub mode: EntryMode,
    /// Entry name (filename or directory name).
    pub name: String,
    /// Content-addressed ID of the referenced object.
    pub object_id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }

    pub fn entry(&self) -> Entry {
        Entry::new(self.mode, self.object_id)
    }

    // Directories sort as if their name ended in '/'.
    fn sort_key(&self) -> impl Iterator<Item = u8> + '_ {
        let suffix = if self.mode.is_tree() { Some(b'/') } else { None };
        self.name.bytes().chain(suffix)
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(other.sort_key())
    }
}

/// Directory listing object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tree {
    /// Entries in canonical order.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a new tree with the given entries, sorted canonically.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as `"<mode> <name>\0<20-byte oid>"` records.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(format!("{} {}\0", entry.mode, entry.name).as_bytes());
            out.extend_from_slice(entry.object_id.as_bytes());
        }
        out
    }

    pub fn parse(id: &ObjectId, data: &[u8]) -> StoreResult<Self> {
        let corrupt = |reason: &str| StoreError::CorruptObject {
            id: *id,
            reason: format!("bad tree entry: {reason}"),
        };

        let mut entries = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| corrupt("missing mode"))?;
            let mode = std::str::from_utf8(&rest[..space])
                .ok()
                .and_then(|s| u32::from_str_radix(s, 8).ok())
                .and_then(EntryMode::from_mode_bits)
                .ok_or_else(|| corrupt("unknown mode"))?;
            rest = &rest[space + 1..];

            let nul = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| corrupt("missing name terminator"))?;
            let name = String::from_utf8(rest[..nul].to_vec())
                .map_err(|_| corrupt("non-utf8 name"))?;
            rest = &rest[nul + 1..];

            if rest.len() < OID_BYTES {
                return Err(corrupt("truncated object id"));
            }
            let object_id = ObjectId::from_slice(&rest[..OID_BYTES])
                .map_err(|_| corrupt("truncated object id"))?;
            rest = &rest[OID_BYTES..];

            entries.push(TreeEntry::new(mode, name, object_id));
        }
        Ok(Self { entries })
    }
}

// ---------------------------------------------------------------------------
// TreeBuilder
// ---------------------------------------------------------------------------

enum Node {
    Leaf(Entry),
    Dir(TreeBuilder),
}

/// Builds nested trees from a flat list of slash-separated paths.
///
/// [`build`](TreeBuilder::build) walks the structure post-order: every
/// subtree is written, and so receives its id, before the tree that names it.
#[derive(Default)]
pub struct TreeBuilder {
    children: BTreeMap<String, Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a leaf at `path`, creating intermediate directories.
    pub fn add(&mut self, path: &str, entry: Entry) {
        match path.split_once('/') {
            None => {
                self.children.insert(path.to_string(), Node::Leaf(entry));
            }
            Some((dir, rest)) => {
                let node = self
                    .children
                    .entry(dir.to_string())
                    .or_insert_with(|| Node::Dir(TreeBuilder::new()));
                if matches!(node, Node::Leaf(_)) {
                    *node = Node::Dir(TreeBuilder::new());
                }
                if let Node::Dir(sub) = node {
                    sub.add(rest, entry);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Write all trees through `write`, children first, and return the root id.
    pub fn build<F>(self, write: &mut F) -> StoreResult<ObjectId>
    where
        F: FnMut(Tree) -> StoreResult<ObjectId>,
    {
        let mut entries = Vec::with_capacity(self.children.len());
        for (name, node) in self.children {
            let entry = match node {
                Node::Leaf(entry) => entry,
                Node::Dir(sub) => Entry::tree(sub.build(write)?),
            };
            entries.push(TreeEntry::new(entry.mode, name, entry.object_id));
        }
        write(Tree::new(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, StoredObject};

    fn oid(seed: &[u8]) -> ObjectId {
        ObjectId::from_bytes(seed)
    }

    #[test]
    fn entries_sort_with_directory_suffix() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Directory, "a", oid(b"dir")),
            TreeEntry::new(EntryMode::Regular, "a.txt", oid(b"file")),
            TreeEntry::new(EntryMode::Regular, "Z", oid(b"z")),
        ]);
        let names: Vec<_> = tree.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Z", "a.txt", "a"]);
    }

    #[test]
    fn tree_bytes_roundtrip() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "file.txt", oid(b"content")),
            TreeEntry::new(EntryMode::Executable, "run.sh", oid(b"script")),
            TreeEntry::new(EntryMode::Directory, "subdir", oid(b"tree")),
        ]);
        let bytes = tree.to_bytes();
        assert!(bytes.starts_with(b"100644 file.txt\0"));
        let parsed = Tree::parse(&ObjectId::null(), &bytes).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn parse_accepts_zero_padded_directory_mode() {
        let mut bytes = b"040000 lib\0".to_vec();
        bytes.extend_from_slice(oid(b"lib").as_bytes());
        let parsed = Tree::parse(&ObjectId::null(), &bytes).unwrap();
        assert_eq!(parsed.entries[0].mode, EntryMode::Directory);
    }

    #[test]
    fn parse_rejects_truncated_oid() {
        let err = Tree::parse(&ObjectId::null(), b"100644 a\0abc").unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn known_tree_id_matches_git() {
        // A tree holding one empty file named "a".
        let empty = oid(b"blob 0\0");
        let tree = Tree::new(vec![TreeEntry::new(EntryMode::Regular, "a", empty)]);
        let stored = Object::Tree(tree).to_stored_object();
        assert_eq!(
            stored.compute_id().to_hex(),
            "496d6428b9cf92981dc9495211e6e1120fb6f2ba"
        );
    }

    #[test]
    fn builder_writes_children_before_parents() {
        let mut builder = TreeBuilder::new();
        builder.add("a/b/c.txt", Entry::new(EntryMode::Regular, oid(b"c")));
        builder.add("a/d.txt", Entry::new(EntryMode::Regular, oid(b"d")));
        builder.add("e.txt", Entry::new(EntryMode::Executable, oid(b"e")));

        let mut written: Vec<(ObjectId, Tree)> = Vec::new();
        let root = builder
            .build(&mut |tree: Tree| {
                let id = StoredObject::new(crate::ObjectKind::Tree, tree.to_bytes()).compute_id();
                written.push((id, tree));
                Ok(id)
            })
            .unwrap();

        assert_eq!(written.len(), 3);
        // a/b, then a, then root
        assert_eq!(written[0].1.entries[0].name, "c.txt");
        assert_eq!(written[1].1.get("b").unwrap().object_id, written[0].0);
        assert_eq!(written[2].0, root);
        let root_tree = &written[2].1;
        assert_eq!(root_tree.get("a").unwrap().object_id, written[1].0);
        assert_eq!(root_tree.get("e.txt").unwrap().mode, EntryMode::Executable);
    }

    #[test]
    fn mode_for_permissions() {
        assert_eq!(EntryMode::for_permissions(0o755), EntryMode::Executable);
        assert_eq!(EntryMode::for_permissions(0o744), EntryMode::Regular);
        assert_eq!(EntryMode::for_permissions(0o644), EntryMode::Regular);
    }

    #[test]
    fn mode_display_matches_tree_format() {
        assert_eq!(EntryMode::Regular.to_string(), "100644");
        assert_eq!(EntryMode::Executable.to_string(), "100755");
        assert_eq!(EntryMode::Directory.to_string(), "40000");
        assert_eq!(EntryMode::from_mode_bits(0o120000), None);
    }
}
