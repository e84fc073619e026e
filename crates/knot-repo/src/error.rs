use std::path::PathBuf;

use thiserror::Error;

use crate::revision::HintedError;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not a knot repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("{message}")]
    InvalidObject {
        message: String,
        errors: Vec<HintedError>,
    },

    #[error("{0}")]
    NoPendingCommit(String),

    #[error("{0}")]
    UnsafeAbort(String),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("invalid config {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    #[error("store error: {0}")]
    Store(#[from] knot_store::StoreError),

    #[error(transparent)]
    Diff(#[from] knot_diff::DiffError),

    #[error(transparent)]
    Index(#[from] knot_index::IndexError),

    #[error(transparent)]
    Ref(#[from] knot_refs::RefError),

    #[error(transparent)]
    Workspace(#[from] knot_workspace::WorkspaceError),

    #[error(transparent)]
    Migration(#[from] knot_workspace::MigrationError),

    #[error(transparent)]
    Merge(#[from] knot_merge::MergeError),

    #[error(transparent)]
    Lock(#[from] knot_types::LockError),

    #[error(transparent)]
    Type(#[from] knot_types::TypeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;
