//! Merge engine for knot.
//!
//! Three pieces, composed by the caller:
//!
//! - [`CommonAncestors`] / [`Bases`]: merge-base search over the commit
//!   graph, reduced to the minimal set of best common ancestors
//! - [`diff3`]: three-way line merge producing clean and conflict chunks
//! - [`Resolve`]: tree-level merge of two commits into the working tree and
//!   index, recording unmerged paths at stages 1 to 3

pub mod bases;
pub mod common_ancestors;
pub mod diff3;
pub mod error;
pub mod inputs;
pub mod resolve;

#[cfg(test)]
pub(crate) mod testing;

pub use bases::Bases;
pub use common_ancestors::{CommonAncestors, Flags};
pub use diff3::{Chunk, Diff3Result};
pub use error::{MergeError, MergeResult};
pub use inputs::Inputs;
pub use resolve::Resolve;
