//! Core reference types.

use std::fmt;

use knot_types::ObjectId;

pub const HEAD: &str = "HEAD";
pub const ORIG_HEAD: &str = "ORIG_HEAD";
pub const REFS_DIR: &str = "refs";
pub const HEADS_DIR: &str = "refs/heads";
pub const REMOTES_DIR: &str = "refs/remotes";

const SYMREF_PREFIX: &str = "ref: ";

/// Contents of a ref file: either a direct oid or a pointer to another ref.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefValue {
    Direct(ObjectId),
    /// Path of the target ref, relative to the repository directory.
    Symbolic(String),
}

impl RefValue {
    /// Parse trimmed ref file content. Returns `None` for anything that is
    /// neither `ref: <path>` nor a full hex oid.
    pub fn parse(content: &str) -> Option<Self> {
        let content = content.trim();
        match content.strip_prefix(SYMREF_PREFIX) {
            Some(target) => Some(Self::Symbolic(target.trim().to_string())),
            None => ObjectId::from_hex(content).ok().map(Self::Direct),
        }
    }
}

impl fmt::Display for RefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(oid) => write!(f, "{oid}"),
            Self::Symbolic(path) => write!(f, "{SYMREF_PREFIX}{path}"),
        }
    }
}

/// A named ref, identified by its path relative to the repository directory
/// (`HEAD`, `refs/heads/master`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymRef {
    pub path: String,
}

impl SymRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn is_head(&self) -> bool {
        self.path == HEAD
    }

    pub fn is_branch(&self) -> bool {
        self.path.starts_with("refs/heads/")
    }

    pub fn is_remote(&self) -> bool {
        self.path.starts_with("refs/remotes/")
    }
}
