//! Scratch repositories for unit tests.

use std::fs;
use std::path::Path;

use chrono::{FixedOffset, TimeZone};
use knot_types::{Author, ObjectId};
use tempfile::TempDir;

use crate::config::RepoConfig;
use crate::repository::Repository;

pub(crate) struct TestRepo {
    _dir: TempDir,
    pub repo: Repository,
    clock: i64,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut repo = Repository::init(dir.path()).unwrap();
        let mut config = RepoConfig::default();
        config.user.name = Some("A. U. Thor".into());
        config.user.email = Some("author@example.com".into());
        repo.set_config(config).unwrap();
        Self {
            _dir: dir,
            repo,
            clock: 1_577_836_800,
        }
    }

    pub fn root(&self) -> &Path {
        self.repo.root()
    }

    pub fn write(&self, path: &str, content: &str) {
        let full = self.root().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    pub fn remove(&self, path: &str) {
        fs::remove_file(self.root().join(path)).unwrap();
    }

    /// Write, stage and commit one file. Each commit is a second later
    /// than the last.
    pub fn commit_file(&mut self, path: &str, content: &str, message: &str) -> ObjectId {
        self.write(path, content);
        self.repo.add(&[path]).unwrap();
        self.clock += 1;
        let time = FixedOffset::east_opt(0)
            .unwrap()
            .timestamp_opt(self.clock, 0)
            .unwrap();
        let author = Author::new("A. U. Thor", "author@example.com", time);
        self.repo.commit_as(message, author).unwrap()
    }
}
