use chrono::{DateTime, FixedOffset};
use knot_types::{Author, ObjectId};

use crate::error::{StoreError, StoreResult};

/// History node: a root tree, its parents, signatures and a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub parents: Vec<ObjectId>,
    pub tree: ObjectId,
    pub author: Author,
    pub committer: Author,
    pub message: String,
}

impl Commit {
    pub fn new(
        parents: Vec<ObjectId>,
        tree: ObjectId,
        author: Author,
        committer: Author,
        message: impl Into<String>,
    ) -> Self {
        Self {
            parents,
            tree,
            author,
            committer,
            message: message.into(),
        }
    }

    /// First parent, if any.
    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Committer time, which orders history walks.
    pub fn date(&self) -> DateTime<FixedOffset> {
        self.committer.time
    }

    pub fn title_line(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            out.push_str(&format!("parent {parent}\n"));
        }
        out.push_str(&format!("author {}\n", self.author));
        out.push_str(&format!("committer {}\n", self.committer));
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    pub fn parse(id: &ObjectId, data: &[u8]) -> StoreResult<Self> {
        let corrupt = |reason: String| StoreError::CorruptObject { id: *id, reason };

        let text = std::str::from_utf8(data).map_err(|_| corrupt("non-utf8 commit".into()))?;
        let (headers, message) = text.split_once("\n\n").unwrap_or((text, ""));

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            // Continuation lines of multi-line headers start with a space.
            if line.starts_with(' ') {
                continue;
            }
            let (key, value) = line.split_once(' ').unwrap_or((line, ""));
            match key {
                "tree" => tree = Some(parse_oid(value).map_err(&corrupt)?),
                "parent" => parents.push(parse_oid(value).map_err(&corrupt)?),
                "author" => author = Some(Author::parse(value).map_err(|e| corrupt(e.to_string()))?),
                "committer" => {
                    committer = Some(Author::parse(value).map_err(|e| corrupt(e.to_string()))?)
                }
                _ => {}
            }
        }

        Ok(Self {
            parents,
            tree: tree.ok_or_else(|| corrupt("missing tree header".into()))?,
            author: author.ok_or_else(|| corrupt("missing author header".into()))?,
            committer: committer.ok_or_else(|| corrupt("missing committer header".into()))?,
            message: message.to_string(),
        })
    }
}

fn parse_oid(value: &str) -> Result<ObjectId, String> {
    ObjectId::from_hex(value).map_err(|e| format!("bad object id '{value}': {e}"))
}
