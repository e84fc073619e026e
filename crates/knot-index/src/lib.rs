//! Staging index for knot.
//!
//! The index is the binary `.git/index` file (`DIRC`, version 2) listing
//! every staged path with its blob id, mode and cached stat data. Unmerged
//! paths are recorded as stage 1/2/3 entries until resolved.
//!
//! # Key Types
//!
//! - [`Index`] -- Loaded index with lock-protected updates
//! - [`IndexEntry`] -- One `(path, stage)` entry and its on-disk encoding
//! - [`FileStat`] -- Working-tree metadata cached per entry

pub mod checksum;
pub mod entry;
pub mod error;
pub mod index;

pub use entry::{mode_for_stat, FileStat, IndexEntry};
pub use error::{IndexError, IndexResult};
pub use index::Index;
