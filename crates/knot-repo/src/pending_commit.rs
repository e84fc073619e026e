//! State of a commit that was interrupted by conflicts.
//!
//! While a merge, cherry-pick or revert waits for conflicts to be resolved,
//! the commit being brought in is kept in `MERGE_HEAD`, `CHERRY_PICK_HEAD`
//! or `REVERT_HEAD`, and the prepared message in `MERGE_MSG`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use knot_types::ObjectId;
use tracing::debug;

use crate::error::{RepoError, RepoResult};

pub const MERGE_MSG: &str = "MERGE_MSG";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MergeType {
    Merge,
    CherryPick,
    Revert,
}

impl MergeType {
    pub const ALL: [MergeType; 3] = [MergeType::Merge, MergeType::CherryPick, MergeType::Revert];

    pub fn head_file(&self) -> &'static str {
        match self {
            MergeType::Merge => "MERGE_HEAD",
            MergeType::CherryPick => "CHERRY_PICK_HEAD",
            MergeType::Revert => "REVERT_HEAD",
        }
    }
}

#[derive(Clone, Debug)]
pub struct PendingCommit {
    root: PathBuf,
    message_path: PathBuf,
}

impl PendingCommit {
    /// Pending state kept in the repository directory `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            message_path: root.join(MERGE_MSG),
            root,
        }
    }

    pub fn message_path(&self) -> &Path {
        &self.message_path
    }

    fn head_path(&self, kind: MergeType) -> PathBuf {
        self.root.join(kind.head_file())
    }

    pub fn start(&self, oid: &ObjectId, kind: MergeType) -> RepoResult<()> {
        fs::write(self.head_path(kind), format!("{oid}\n"))?;
        debug!(%oid, file = kind.head_file(), "pending commit started");
        Ok(())
    }

    pub fn write_message(&self, message: &str) -> RepoResult<()> {
        fs::write(&self.message_path, message)?;
        Ok(())
    }

    /// Forget the pending commit of `kind` and its message.
    pub fn clear(&self, kind: MergeType) -> RepoResult<()> {
        let head_path = self.head_path(kind);
        match fs::remove_file(&head_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RepoError::NoPendingCommit(format!(
                    "There is no merge to abort ({} missing).",
                    kind.head_file()
                )));
            }
            Err(e) => return Err(e.into()),
        }
        match fs::remove_file(&self.message_path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    pub fn in_progress(&self) -> bool {
        self.merge_type().is_some()
    }

    /// Which kind of commit is pending, if any.
    pub fn merge_type(&self) -> Option<MergeType> {
        MergeType::ALL
            .into_iter()
            .find(|kind| self.head_path(*kind).is_file())
    }

    pub fn merge_oid(&self, kind: MergeType) -> RepoResult<ObjectId> {
        let content = match fs::read_to_string(self.head_path(kind)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RepoError::NoPendingCommit(format!(
                    "There is no merge in progress ({} missing).",
                    kind.head_file()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(ObjectId::from_hex(content.trim())?)
    }

    pub fn merge_message(&self) -> RepoResult<String> {
        Ok(fs::read_to_string(&self.message_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn oid() -> ObjectId {
        ObjectId::from_bytes(b"pending")
    }

    #[test]
    fn start_records_head_file() {
        let dir = TempDir::new().unwrap();
        let pending = PendingCommit::new(dir.path());
        assert!(!pending.in_progress());

        pending.start(&oid(), MergeType::CherryPick).unwrap();
        assert!(pending.in_progress());
        assert_eq!(pending.merge_type(), Some(MergeType::CherryPick));
        assert_eq!(pending.merge_oid(MergeType::CherryPick).unwrap(), oid());
        assert_eq!(
            fs::read_to_string(dir.path().join("CHERRY_PICK_HEAD")).unwrap(),
            format!("{}\n", oid())
        );
    }

    #[test]
    fn clear_removes_head_and_message() {
        let dir = TempDir::new().unwrap();
        let pending = PendingCommit::new(dir.path());
        pending.start(&oid(), MergeType::Merge).unwrap();
        pending.write_message("Merge topic\n").unwrap();
        assert_eq!(pending.merge_message().unwrap(), "Merge topic\n");

        pending.clear(MergeType::Merge).unwrap();
        assert!(!pending.in_progress());
        assert!(!pending.message_path().exists());
    }

    #[test]
    fn missing_state_is_reported() {
        let dir = TempDir::new().unwrap();
        let pending = PendingCommit::new(dir.path());

        let err = pending.clear(MergeType::Merge).unwrap_err();
        assert_eq!(err.to_string(), "There is no merge to abort (MERGE_HEAD missing).");

        let err = pending.merge_oid(MergeType::Revert).unwrap_err();
        assert_eq!(err.to_string(), "There is no merge in progress (REVERT_HEAD missing).");
    }
}
