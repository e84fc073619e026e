use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid author line: {0}")]
    InvalidAuthor(String),
}

/// Errors produced while acquiring or releasing a [`Lockfile`](crate::Lockfile).
#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "Unable to create '{}': File exists.\n\n\
         Another knot process seems to be running in this repository.\n\
         Please make sure all processes are terminated then try again.\n\
         If it still fails, a knot process may have crashed in this\n\
         repository earlier: remove the file manually to continue.",
        .0.display()
    )]
    LockDenied(PathBuf),

    #[error("unable to create '{}': parent directory does not exist", .0.display())]
    MissingParent(PathBuf),

    #[error("unable to create '{}': permission denied", .0.display())]
    NoPermission(PathBuf),

    #[error("not holding lock on file: {}", .0.display())]
    StaleLock(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
