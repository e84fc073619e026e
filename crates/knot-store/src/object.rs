use std::fmt;
use std::str::FromStr;

use knot_types::ObjectId;

use crate::commit::Commit;
use crate::error::{StoreError, StoreResult};
use crate::tree::Tree;

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// Raw content (file contents).
    Blob,
    /// Directory listing: ordered entries mapping names to object references.
    Tree,
    /// History node: root tree, parents, signatures and message.
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            other => Err(format!("unknown object type '{other}'")),
        }
    }
}

/// A stored object: kind tag + serialized payload + cached size.
///
/// `StoredObject` is the unit the backends persist. Its identity is the
/// SHA-1 of `"<kind> <size>\0<data>"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The serialized payload (without the frame header).
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// The framed bytes `"<kind> <size>\0<data>"` that are hashed and
    /// compressed on disk.
    pub fn framed(&self) -> Vec<u8> {
        let header = format!("{} {}\0", self.kind, self.data.len());
        let mut out = Vec::with_capacity(header.len() + self.data.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        ObjectId::from_bytes(&self.framed())
    }

    /// Split framed bytes back into kind and payload, verifying the length.
    pub fn from_framed(id: &ObjectId, framed: &[u8]) -> StoreResult<Self> {
        let corrupt = |reason: String| StoreError::CorruptObject { id: *id, reason };

        let space = framed
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| corrupt("missing type separator".into()))?;
        let nul = framed[space..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| p + space)
            .ok_or_else(|| corrupt("missing header terminator".into()))?;

        let kind = std::str::from_utf8(&framed[..space])
            .map_err(|_| corrupt("non-utf8 type tag".into()))?
            .parse::<ObjectKind>()
            .map_err(corrupt)?;
        let size: u64 = std::str::from_utf8(&framed[space + 1..nul])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| corrupt("invalid size field".into()))?;

        let data = framed[nul + 1..].to_vec();
        if data.len() as u64 != size {
            return Err(corrupt(format!(
                "size mismatch: header says {size}, payload has {}",
                data.len()
            )));
        }
        Ok(Self::new(kind, data))
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Content as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Parsed object: the closed set of kinds the database understands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
        }
    }

    /// Serialize into the storable form.
    pub fn to_stored_object(&self) -> StoredObject {
        let data = match self {
            Self::Blob(blob) => blob.data.clone(),
            Self::Tree(tree) => tree.to_bytes(),
            Self::Commit(commit) => commit.to_bytes(),
        };
        StoredObject::new(self.kind(), data)
    }

    /// Parse a stored payload by dispatching on its kind tag.
    pub fn from_stored_object(id: &ObjectId, stored: &StoredObject) -> StoreResult<Self> {
        match stored.kind {
            ObjectKind::Blob => Ok(Self::Blob(Blob::new(stored.data.clone()))),
            ObjectKind::Tree => Tree::parse(id, &stored.data).map(Self::Tree),
            ObjectKind::Commit => Commit::parse(id, &stored.data).map(Self::Commit),
        }
    }
}

impl From<Blob> for Object {
    fn from(blob: Blob) -> Self {
        Self::Blob(blob)
    }
}

impl From<Tree> for Object {
    fn from(tree: Tree) -> Self {
        Self::Tree(tree)
    }
}

impl From<Commit> for Object {
    fn from(commit: Commit) -> Self {
        Self::Commit(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_id_matches_git() {
        let stored = Object::from(Blob::new("hello\n")).to_stored_object();
        assert_eq!(
            stored.compute_id().to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    #[test]
    fn framed_roundtrip() {
        let stored = StoredObject::new(ObjectKind::Blob, b"abc".to_vec());
        let framed = stored.framed();
        assert_eq!(&framed[..7], b"blob 3\0");
        let back = StoredObject::from_framed(&stored.compute_id(), &framed).unwrap();
        assert_eq!(back, stored);
    }

    #[test]
    fn framed_rejects_unknown_kind() {
        let id = ObjectId::null();
        let err = StoredObject::from_framed(&id, b"widget 1\0x").unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn framed_rejects_size_mismatch() {
        let id = ObjectId::null();
        let err = StoredObject::from_framed(&id, b"blob 5\0abc").unwrap_err();
        assert!(err.to_string().contains("size mismatch"));
    }

    #[test]
    fn framed_rejects_missing_header() {
        let id = ObjectId::null();
        assert!(StoredObject::from_framed(&id, b"blob").is_err());
        assert!(StoredObject::from_framed(&id, b"blob 3").is_err());
    }

    #[test]
    fn kind_parse_and_display() {
        for kind in [ObjectKind::Blob, ObjectKind::Tree, ObjectKind::Commit] {
            assert_eq!(kind.to_string().parse::<ObjectKind>().unwrap(), kind);
        }
        assert!("tag".parse::<ObjectKind>().is_err());
    }
}
