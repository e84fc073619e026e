//! Error types for reference operations.

use knot_types::LockError;
use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The branch does not exist.
    #[error("branch '{name}' not found.")]
    NotFound { name: String },

    /// A branch with this name already exists.
    #[error("A branch named '{name}' already exists.")]
    AlreadyExists { name: String },

    /// The branch name fails validation.
    #[error("'{name}' is not a valid branch name.")]
    InvalidName { name: String },

    /// A ref file holds something that is neither an oid nor a symref.
    #[error("corrupt ref {path}: {content:?}")]
    Corrupt { path: String, content: String },

    /// The ref file lock could not be acquired or released.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// I/O error during file-based ref operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
