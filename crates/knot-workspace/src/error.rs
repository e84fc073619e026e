//! Error types for working-tree access and migrations.

use knot_index::IndexError;
use knot_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A requested path does not exist in the working tree.
    #[error("pathspec '{0}' did not match any files")]
    MissingFile(String),

    #[error("{op}('{path}'): Permission denied")]
    NoPermission { op: &'static str, path: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// Local state would be lost. Each message is one grouped report.
    #[error("{}", .0.join("\n\n"))]
    Conflict(Vec<String>),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type MigrationResult<T> = Result<T, MigrationError>;
