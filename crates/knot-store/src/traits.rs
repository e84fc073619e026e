use knot_types::ObjectId;

use crate::error::StoreResult;
use crate::object::StoredObject;

/// Content-addressed storage backend.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. The same kind and data always
///   produce the same ID.
/// - Writing an object that already exists is a no-op.
/// - A partially written object is never observable by readers.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    /// Returns `Err` on I/O failure or data corruption.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// All stored IDs whose hex form starts with `prefix`.
    ///
    /// Prefixes shorter than two characters match nothing.
    fn prefix_match(&self, prefix: &str) -> StoreResult<Vec<ObjectId>>;
}
