//! Repository layer for knot.
//!
//! [`Repository`] ties the object database, index, refs and working tree
//! together and implements the user-level operations on top of them:
//! staging, commits, status, checkout, merges, cherry-picks and reverts.
//! Revision expressions are parsed by [`Revision`] and history is walked
//! with [`RevList`].

pub mod config;
pub mod error;
pub mod pending_commit;
pub mod repository;
pub mod rev_list;
pub mod revision;
pub mod sequencer;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use config::RepoConfig;
pub use error::{RepoError, RepoResult};
pub use pending_commit::{MergeType, PendingCommit};
pub use repository::{MergeOutcome, Repository, SequenceOutcome, GIT_DIR};
pub use rev_list::{RevList, RevListItem, RevListOptions};
pub use revision::{HintedError, Rev, Revision, HEAD};
pub use sequencer::{Action, SequenceOptions, Sequencer};
pub use status::Status;
