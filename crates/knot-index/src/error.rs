//! Error types for the index crate.

use knot_types::LockError;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The index file failed signature, version, or checksum validation.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// The index lock could not be taken or released.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// A tree cannot be written while unmerged entries exist.
    #[error("cannot write tree: unmerged paths: {}", .0.join(", "))]
    Conflict(Vec<String>),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] knot_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
