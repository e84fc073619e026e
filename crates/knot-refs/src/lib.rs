//! Reference management for knot.
//!
//! Refs are the human-readable entry points into history: branch files under
//! `refs/heads/`, remote-tracking refs under `refs/remotes/`, and `HEAD`,
//! which is either a symbolic pointer to the current branch or a detached
//! commit id.
//!
//! # Modules
//!
//! - [`error`]: Error types for ref operations
//! - [`types`]: [`RefValue`] (ref file contents) and [`SymRef`] (named ref)
//! - [`refs`]: The file-backed [`Refs`] store
//! - [`names`]: Branch name validation

pub mod error;
pub mod names;
pub mod refs;
pub mod types;

pub use error::{RefError, Result};
pub use names::validate_branch_name;
pub use refs::Refs;
pub use types::{RefValue, SymRef, HEAD, HEADS_DIR, ORIG_HEAD, REFS_DIR, REMOTES_DIR};
