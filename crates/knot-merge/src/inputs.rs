use knot_store::{Database, StoreResult};
use knot_types::ObjectId;

use crate::bases::Bases;

/// The two commits being merged, the names they were given, and their
/// merge bases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inputs {
    pub left_name: String,
    pub right_name: String,
    pub left_oid: ObjectId,
    pub right_oid: ObjectId,
    pub base_oids: Vec<ObjectId>,
}

impl Inputs {
    /// Compute the merge bases of two already-resolved commits.
    pub fn new(
        db: &Database,
        left_name: impl Into<String>,
        right_name: impl Into<String>,
        left_oid: ObjectId,
        right_oid: ObjectId,
    ) -> StoreResult<Self> {
        let base_oids = Bases::new(db, &left_oid, &right_oid)?.find()?;
        Ok(Self {
            left_name: left_name.into(),
            right_name: right_name.into(),
            left_oid,
            right_oid,
            base_oids,
        })
    }

    /// The right side is already contained in the left.
    pub fn already_merged(&self) -> bool {
        self.base_oids.first() == Some(&self.right_oid)
    }

    /// The left side is an ancestor of the right, so the right can simply
    /// be checked out.
    pub fn fast_forward(&self) -> bool {
        self.base_oids.first() == Some(&self.left_oid)
    }
}
