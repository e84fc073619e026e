//! Working-tree access for knot.
//!
//! The core never touches checked-out files directly: it goes through the
//! [`Workspace`] trait. On top of it, [`Migration`] moves the working tree
//! and index from one commit's tree to another, refusing when local work
//! would be lost.

pub mod error;
pub mod inspector;
pub mod migration;
pub mod workspace;

pub use error::{MigrationError, MigrationResult, WorkspaceError, WorkspaceResult};
pub use inspector::{ChangeType, Inspector};
pub use migration::{Changes, ConflictKind, Migration};
pub use workspace::{FsWorkspace, Workspace};
