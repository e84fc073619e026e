use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::TypeError;

/// Number of raw bytes in an object identifier.
pub const OID_BYTES: usize = 20;

/// Length of the hex form of an object identifier.
pub const OID_HEX_LEN: usize = 40;

/// Length of the abbreviated hex form shown to users.
pub const SHORT_OID_LEN: usize = 7;

/// Content-addressed identifier for any stored object.
///
/// An `ObjectId` is the SHA-1 digest of an object's framed content
/// (`"<type> <length>\0<payload>"`). Identical content always produces the
/// same `ObjectId`, so objects are deduplicated and verifiable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; OID_BYTES]);

impl ObjectId {
    /// Compute an `ObjectId` as the SHA-1 digest of raw bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Create an `ObjectId` from a pre-computed digest.
    pub fn from_hash(hash: [u8; OID_BYTES]) -> Self {
        Self(hash)
    }

    /// Read an `ObjectId` from a raw 20-byte slice, as found in tree
    /// entries and index records.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != OID_BYTES {
            return Err(TypeError::InvalidLength {
                expected: OID_BYTES,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; OID_BYTES];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// The null object ID (all zeros). Represents "no object".
    pub const fn null() -> Self {
        Self([0u8; OID_BYTES])
    }

    /// Returns `true` if this is the null object ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; OID_BYTES]
    }

    /// The raw 20-byte digest.
    pub fn as_bytes(&self) -> &[u8; OID_BYTES] {
        &self.0
    }

    /// Hex-encoded string representation (40 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex representation (first 7 characters).
    pub fn short_hex(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHORT_OID_LEN);
        hex
    }

    /// Parse from a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Returns `true` if `s` looks like a full hex object id.
    pub fn is_full_hex(s: &str) -> bool {
        s.len() == OID_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; OID_BYTES]> for ObjectId {
    fn from(bytes: [u8; OID_BYTES]) -> Self {
        Self(bytes)
    }
}

impl From<ObjectId> for [u8; OID_BYTES] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_matches_known_sha1() {
        // sha1("blob 0\0"), the empty blob.
        let id = ObjectId::from_bytes(b"blob 0\0");
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn different_data_produces_different_ids() {
        let id1 = ObjectId::from_bytes(b"hello");
        let id2 = ObjectId::from_bytes(b"world");
        assert_ne!(id1, id2);
    }

    #[test]
    fn null_is_all_zeros() {
        let null = ObjectId::null();
        assert!(null.is_null());
        assert_eq!(null.as_bytes(), &[0u8; OID_BYTES]);
    }

    #[test]
    fn hex_roundtrip() {
        let id = ObjectId::from_bytes(b"test");
        let parsed: ObjectId = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_short_hex() {
        let err = ObjectId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: OID_BYTES,
                actual: 2
            }
        );
        assert!(ObjectId::from_hex("zz").is_err());
    }

    #[test]
    fn short_hex_is_7_chars() {
        let id = ObjectId::from_bytes(b"test");
        assert_eq!(id.short_hex().len(), SHORT_OID_LEN);
        assert!(id.to_hex().starts_with(&id.short_hex()));
    }

    #[test]
    fn display_is_full_hex() {
        let id = ObjectId::from_bytes(b"test");
        let display = format!("{id}");
        assert_eq!(display.len(), OID_HEX_LEN);
        assert!(ObjectId::is_full_hex(&display));
        assert!(!ObjectId::is_full_hex("HEAD"));
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::from_bytes(b"serde test");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ordering_is_consistent() {
        let id1 = ObjectId::from_hash([0; OID_BYTES]);
        let id2 = ObjectId::from_hash([1; OID_BYTES]);
        assert!(id1 < id2);
    }
}
