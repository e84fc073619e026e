use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::LockError;

/// Exclusive advisory lock over a file, taken by creating `<path>.lock`.
///
/// New content is written into the lock file and published with
/// [`commit`](Lockfile::commit), which renames it over the target.
/// [`rollback`](Lockfile::rollback) discards it. A lock still held when the
/// value is dropped is rolled back.
#[derive(Debug)]
pub struct Lockfile {
    file_path: PathBuf,
    lock_path: PathBuf,
    lock: Option<File>,
}

impl Lockfile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let file_path = path.into();
        let mut lock_name = file_path.clone().into_os_string();
        lock_name.push(".lock");
        Self {
            file_path,
            lock_path: PathBuf::from(lock_name),
            lock: None,
        }
    }

    /// Path of the file this lock protects.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Path of the `.lock` file itself.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn is_held(&self) -> bool {
        self.lock.is_some()
    }

    /// Acquire the lock. Fails immediately with `LockDenied` if another
    /// process holds it; never waits.
    pub fn hold_for_update(&mut self) -> Result<(), LockError> {
        if self.lock.is_some() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => LockError::LockDenied(self.lock_path.clone()),
                ErrorKind::NotFound => LockError::MissingParent(self.lock_path.clone()),
                ErrorKind::PermissionDenied => LockError::NoPermission(self.lock_path.clone()),
                _ => LockError::Io(e),
            })?;
        debug!(path = %self.lock_path.display(), "lock acquired");
        self.lock = Some(file);
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), LockError> {
        let file = self.held_file()?;
        file.write_all(data)?;
        Ok(())
    }

    /// Publish the written content by renaming the lock over the target.
    pub fn commit(&mut self) -> Result<(), LockError> {
        let file = self.held_file()?;
        file.flush()?;
        file.sync_all()?;
        fs::rename(&self.lock_path, &self.file_path)?;
        self.lock = None;
        debug!(path = %self.file_path.display(), "lock committed");
        Ok(())
    }

    /// Release the lock without touching the target file.
    pub fn rollback(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.lock.take() {
            drop(file);
            fs::remove_file(&self.lock_path)?;
            debug!(path = %self.lock_path.display(), "lock rolled back");
        }
        Ok(())
    }

    fn held_file(&mut self) -> Result<&mut File, LockError> {
        match self.lock.as_mut() {
            Some(file) => Ok(file),
            None => Err(LockError::StaleLock(self.lock_path.clone())),
        }
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if self.lock.is_some() {
            if let Err(err) = self.rollback() {
                warn!(path = %self.lock_path.display(), error = %err, "failed to release lock");
            }
        }
    }
}
