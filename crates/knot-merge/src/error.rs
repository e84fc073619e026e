//! Error types for the merge engine.
//!
//! Merge conflicts are not errors: they are recorded in the index and
//! reported through [`crate::Resolve`]. These variants cover failures of
//! the layers below.

use knot_diff::DiffError;
use knot_store::StoreError;
use knot_workspace::{MigrationError, WorkspaceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    /// Applying the clean part of a merge would overwrite local changes.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

pub type MergeResult<T> = Result<T, MergeError>;
