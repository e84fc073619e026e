//! Commit-graph fixtures shared by the unit tests.

use chrono::{FixedOffset, TimeZone};
use knot_store::{Blob, Commit, Database, Entry, EntryMode, Tree, TreeBuilder};
use knot_types::{Author, ObjectId};

pub(crate) struct Graph {
    pub db: Database,
    clock: i64,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            db: Database::in_memory(),
            clock: 1_700_000_000,
        }
    }

    /// A tree holding `files`, each a regular file.
    pub fn tree(&self, files: &[(&str, &str)]) -> ObjectId {
        let mut builder = TreeBuilder::new();
        for (path, content) in files {
            let blob = self.db.store(&Blob::new(*content).into()).unwrap();
            builder.add(path, Entry::new(EntryMode::Regular, blob));
        }
        builder
            .build(&mut |tree: Tree| self.db.store(&tree.into()))
            .unwrap()
    }

    /// A commit with an empty tree, one second newer than the last.
    pub fn commit(&mut self, message: &str, parents: &[ObjectId]) -> ObjectId {
        let tree = self.tree(&[]);
        self.commit_tree(message, parents, tree)
    }

    pub fn commit_files(
        &mut self,
        message: &str,
        parents: &[ObjectId],
        files: &[(&str, &str)],
    ) -> ObjectId {
        let tree = self.tree(files);
        self.commit_tree(message, parents, tree)
    }

    fn commit_tree(&mut self, message: &str, parents: &[ObjectId], tree: ObjectId) -> ObjectId {
        self.clock += 1;
        let time = FixedOffset::east_opt(0)
            .unwrap()
            .timestamp_opt(self.clock, 0)
            .unwrap();
        let author = Author::new("A. U. Thor", "author@example.com", time);
        let commit = Commit::new(parents.to_vec(), tree, author.clone(), author, message);
        self.db.store(&commit.into()).unwrap()
    }
}
