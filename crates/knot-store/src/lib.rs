//! Content-addressed object storage for knot.
//!
//! Every piece of history (file contents, directory snapshots, commits) is
//! stored as an immutable object identified by the SHA-1 of its framed
//! content, in the same loose-object layout as `.git/objects/`.
//!
//! # Object Types
//!
//! - [`Blob`]: raw file content
//! - [`Tree`]: directory listing mapping names to object references
//! - [`Commit`]: root tree, parents, author/committer and message
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`FileObjectStore`]: zlib-compressed loose objects on disk
//! - [`InMemoryObjectStore`]: `HashMap`-based store for tests and embedding
//!
//! [`Database`] layers parsing and a per-handle object cache on top.
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writes go through a temp file and an atomic rename.
//! 3. Writing an existing object is a no-op, so no locking is required.
//! 4. Trees are written children-first: a tree's id depends on its children.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod commit;
pub mod database;
pub mod error;
pub mod file;
pub mod memory;
pub mod object;
pub mod traits;
pub mod tree;

// Re-export primary types at crate root for ergonomic imports.
pub use commit::Commit;
pub use database::Database;
pub use error::{StoreError, StoreResult};
pub use file::FileObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{Blob, Object, ObjectKind, StoredObject};
pub use traits::ObjectStore;
pub use tree::{Entry, EntryMode, Tree, TreeBuilder, TreeEntry};
