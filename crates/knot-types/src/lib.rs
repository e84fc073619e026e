//! Foundation types for knot.
//!
//! This crate provides the identifier, signature and locking primitives used
//! throughout the knot workspace. Every other knot crate depends on
//! `knot-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: content-addressed identifier (SHA-1 over framed content)
//! - [`Author`]: name, email and timestamp of a commit author or committer
//! - [`Lockfile`]: exclusive `<path>.lock` guard with commit/rollback

pub mod author;
pub mod error;
pub mod lockfile;
pub mod object;

pub use author::Author;
pub use error::{LockError, TypeError};
pub use lockfile::Lockfile;
pub use object::{ObjectId, OID_BYTES, OID_HEX_LEN, SHORT_OID_LEN};
