use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use knot_types::{ObjectId, OID_HEX_LEN};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// Loose-object store on disk.
///
/// Each object lives at `<root>/<hex[0:2]>/<hex[2:]>` as the zlib-compressed
/// framed bytes. Writes go to a `tmp_obj_*` file in the same directory and
/// are renamed into place, so readers only ever see complete objects.
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }
}

impl ObjectStore for FileObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let compressed = match fs::read(self.object_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut framed = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut framed)
            .map_err(|e| StoreError::CorruptObject {
                id: *id,
                reason: format!("inflate failed: {e}"),
            })?;

        StoredObject::from_framed(id, &framed).map(Some)
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let framed = object.framed();
        let id = ObjectId::from_bytes(&framed);
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }

        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&framed)?;
        let compressed = encoder.finish()?;

        let mut temp = tempfile::Builder::new()
            .prefix("tmp_obj_")
            .tempfile_in(dir)?;
        temp.write_all(&compressed)?;
        temp.persist(&path).map_err(|e| e.error)?;

        debug!(object = %id.short_hex(), kind = %object.kind, size = object.size, "stored object");
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).is_file())
    }

    fn prefix_match(&self, prefix: &str) -> StoreResult<Vec<ObjectId>> {
        if prefix.len() < 2 || !prefix.is_ascii() {
            return Ok(Vec::new());
        }
        let (dir_name, rest) = prefix.split_at(2);
        let entries = match fs::read_dir(self.root.join(dir_name)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(rest) {
                continue;
            }
            let hex = format!("{dir_name}{name}");
            if hex.len() == OID_HEX_LEN {
                if let Ok(id) = ObjectId::from_hex(&hex) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = FileObjectStore::new(dir.path().join("objects"));
        (dir, store)
    }

    #[test]
    fn write_places_object_by_hex_prefix() {
        let (_dir, store) = setup();
        let obj = StoredObject::new(ObjectKind::Blob, b"hello\n".to_vec());
        let id = store.write(&obj).unwrap();

        let path = store.object_path(&id);
        assert!(path.ends_with("ce/013625030ba8dba906f756967f9e9ca394464a"));
        assert!(path.is_file());
        assert_eq!(store.read(&id).unwrap().unwrap(), obj);
    }

    #[test]
    fn write_is_idempotent_and_leaves_no_temp_files() {
        let (_dir, store) = setup();
        let obj = StoredObject::new(ObjectKind::Blob, b"same".to_vec());
        let id1 = store.write(&obj).unwrap();
        let id2 = store.write(&obj).unwrap();
        assert_eq!(id1, id2);

        let dir = store.object_path(&id1);
        let names: Vec<_> = fs::read_dir(dir.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn missing_object_reads_as_none() {
        let (_dir, store) = setup();
        let id = ObjectId::from_bytes(b"nope");
        assert!(store.read(&id).unwrap().is_none());
        assert!(!store.exists(&id).unwrap());
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let (_dir, store) = setup();
        let id = ObjectId::from_bytes(b"garbage");
        let path = store.object_path(&id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not zlib at all").unwrap();

        let err = store.read(&id).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn prefix_match_scans_directory() {
        let (_dir, store) = setup();
        let a = store
            .write(&StoredObject::new(ObjectKind::Blob, b"abc".to_vec()))
            .unwrap();
        store
            .write(&StoredObject::new(ObjectKind::Blob, b"def".to_vec()))
            .unwrap();

        assert_eq!(store.prefix_match("f2ba8f").unwrap(), vec![a]);
        assert!(store.prefix_match("ffffff").unwrap().is_empty());
        assert!(store.prefix_match("f").unwrap().is_empty());
    }
}
