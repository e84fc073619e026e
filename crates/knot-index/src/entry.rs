//! Index entries and the cached file metadata they carry.

use std::fs::Metadata;

use knot_store::{Entry, EntryMode};
use knot_types::{ObjectId, OID_BYTES};

use crate::error::{IndexError, IndexResult};

pub const REGULAR_MODE: u32 = 0o100644;
pub const EXECUTABLE_MODE: u32 = 0o100755;
/// Longest path length representable in the flags field.
pub const MAX_PATH_SIZE: usize = 0xfff;
/// Entries are padded to a multiple of this many bytes.
pub const ENTRY_BLOCK: usize = 8;
pub const ENTRY_MIN_SIZE: usize = 64;

/// Fixed-width part of an entry: ten u32 fields, the oid, and the flags.
const FIXED_SIZE: usize = 10 * 4 + OID_BYTES + 2;

/// Working-tree file metadata as cached in the index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileStat {
    pub ctime: u32,
    pub ctime_nsec: u32,
    pub mtime: u32,
    pub mtime_nsec: u32,
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl FileStat {
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime: meta.ctime() as u32,
            ctime_nsec: meta.ctime_nsec() as u32,
            mtime: meta.mtime() as u32,
            mtime_nsec: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let since_epoch = |t: std::io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .unwrap_or_default()
        };
        let mtime = since_epoch(meta.modified());
        let ctime = since_epoch(meta.created());
        Self {
            ctime: ctime.as_secs() as u32,
            ctime_nsec: ctime.subsec_nanos(),
            mtime: mtime.as_secs() as u32,
            mtime_nsec: mtime.subsec_nanos(),
            mode: if meta.is_dir() { 0o40755 } else { REGULAR_MODE },
            size: meta.len() as u32,
            ..Self::default()
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & 0o170000 == 0o040000
    }

    pub fn is_file(&self) -> bool {
        self.mode & 0o170000 == 0o100000
    }
}

/// Index mode for a stat: executable only when all three execute bits are set.
pub fn mode_for_stat(stat: &FileStat) -> u32 {
    EntryMode::for_permissions(stat.mode & 0o777).mode_bits()
}

/// One staged path at one merge stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime: u32,
    pub ctime_nsec: u32,
    pub mtime: u32,
    pub mtime_nsec: u32,
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub oid: ObjectId,
    pub flags: u16,
    pub path: String,
}

impl IndexEntry {
    /// Stage-0 entry for a file read from the working tree.
    pub fn new(path: impl Into<String>, oid: ObjectId, stat: &FileStat) -> Self {
        let path = path.into();
        Self {
            ctime: stat.ctime,
            ctime_nsec: stat.ctime_nsec,
            mtime: stat.mtime,
            mtime_nsec: stat.mtime_nsec,
            dev: stat.dev,
            ino: stat.ino,
            mode: mode_for_stat(stat),
            uid: stat.uid,
            gid: stat.gid,
            size: stat.size,
            oid,
            flags: flags_for(&path, 0),
            path,
        }
    }

    /// Entry built from a tree entry, with all cached metadata zeroed.
    pub fn from_db(path: impl Into<String>, item: &Entry, stage: u8) -> Self {
        let path = path.into();
        Self {
            ctime: 0,
            ctime_nsec: 0,
            mtime: 0,
            mtime_nsec: 0,
            dev: 0,
            ino: 0,
            mode: item.mode.mode_bits(),
            uid: 0,
            gid: 0,
            size: 0,
            oid: item.object_id,
            flags: flags_for(&path, stage),
            path,
        }
    }

    pub fn stage(&self) -> u8 {
        ((self.flags >> 12) & 0x3) as u8
    }

    pub fn key(&self) -> (String, u8) {
        (self.path.clone(), self.stage())
    }

    pub fn entry_mode(&self) -> EntryMode {
        EntryMode::from_mode_bits(self.mode).unwrap_or(EntryMode::Regular)
    }

    /// The tree entry this index entry stands for.
    pub fn to_tree_entry(&self) -> Entry {
        Entry::new(self.entry_mode(), self.oid)
    }

    /// Every proper ancestor directory, shallowest first:
    /// `a/b/c.txt` gives `["a", "a/b"]`.
    pub fn parent_directories(&self) -> Vec<String> {
        parent_directories(&self.path)
    }

    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Size and mode agree with `stat`. A cached size of zero means unknown.
    pub fn stat_match(&self, stat: &FileStat) -> bool {
        (self.size == 0 || self.size == stat.size) && self.mode == mode_for_stat(stat)
    }

    pub fn times_match(&self, stat: &FileStat) -> bool {
        self.ctime == stat.ctime
            && self.ctime_nsec == stat.ctime_nsec
            && self.mtime == stat.mtime
            && self.mtime_nsec == stat.mtime_nsec
    }

    pub fn update_stat(&mut self, stat: &FileStat) {
        self.ctime = stat.ctime;
        self.ctime_nsec = stat.ctime_nsec;
        self.mtime = stat.mtime;
        self.mtime_nsec = stat.mtime_nsec;
        self.dev = stat.dev;
        self.ino = stat.ino;
        self.mode = mode_for_stat(stat);
        self.uid = stat.uid;
        self.gid = stat.gid;
        self.size = stat.size;
    }

    /// Serialized form, NUL-terminated and zero-padded to [`ENTRY_BLOCK`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENTRY_MIN_SIZE);
        for field in [
            self.ctime,
            self.ctime_nsec,
            self.mtime,
            self.mtime_nsec,
            self.dev,
            self.ino,
            self.mode,
            self.uid,
            self.gid,
            self.size,
        ] {
            buf.extend_from_slice(&field.to_be_bytes());
        }
        buf.extend_from_slice(self.oid.as_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(self.path.as_bytes());
        buf.push(0);
        while buf.len() % ENTRY_BLOCK != 0 {
            buf.push(0);
        }
        buf
    }

    /// Parse one padded entry block.
    pub fn parse(data: &[u8]) -> IndexResult<Self> {
        if data.len() < FIXED_SIZE + 1 {
            return Err(IndexError::CorruptIndex(format!(
                "entry too short: {} bytes",
                data.len()
            )));
        }
        let word = |i: usize| {
            let at = i * 4;
            u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
        };
        let oid_at = 40;
        let oid = ObjectId::from_slice(&data[oid_at..oid_at + OID_BYTES])
            .map_err(|e| IndexError::CorruptIndex(e.to_string()))?;
        let flags_at = oid_at + OID_BYTES;
        let flags = u16::from_be_bytes([data[flags_at], data[flags_at + 1]]);

        let name = &data[FIXED_SIZE..];
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        let path = String::from_utf8(name[..end].to_vec())
            .map_err(|_| IndexError::CorruptIndex("entry path is not valid UTF-8".into()))?;

        Ok(Self {
            ctime: word(0),
            ctime_nsec: word(1),
            mtime: word(2),
            mtime_nsec: word(3),
            dev: word(4),
            ino: word(5),
            mode: word(6),
            uid: word(7),
            gid: word(8),
            size: word(9),
            oid,
            flags,
            path,
        })
    }
}

fn flags_for(path: &str, stage: u8) -> u16 {
    ((stage as u16 & 0x3) << 12) | path.len().min(MAX_PATH_SIZE) as u16
}

pub(crate) fn parent_directories(path: &str) -> Vec<String> {
    path.match_indices('/')
        .map(|(i, _)| path[..i].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(mode: u32, size: u32) -> FileStat {
        FileStat {
            mtime: 1_700_000_000,
            mtime_nsec: 42,
            ctime: 1_700_000_000,
            mode,
            size,
            ..FileStat::default()
        }
    }

    #[test]
    fn short_path_pads_to_minimum_size() {
        let entry = IndexEntry::new("a", ObjectId::from_bytes(b"x"), &stat(0o100644, 1));
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len(), ENTRY_MIN_SIZE);
        assert_eq!(*bytes.last().unwrap(), 0);
        assert_eq!(IndexEntry::parse(&bytes).unwrap(), entry);
    }

    #[test]
    fn padding_always_ends_in_nul() {
        // 62 fixed bytes + 10 path bytes = 72, so the terminator needs another block.
        let entry = IndexEntry::new("abcdefghij", ObjectId::from_bytes(b"x"), &stat(0o100644, 1));
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len(), 80);
        assert_eq!(IndexEntry::parse(&bytes).unwrap().path, "abcdefghij");
    }

    #[test]
    fn flags_hold_stage_and_length() {
        let item = Entry::new(EntryMode::Executable, ObjectId::from_bytes(b"x"));
        let entry = IndexEntry::from_db("dir/file", &item, 2);
        assert_eq!(entry.stage(), 2);
        assert_eq!(entry.flags & 0xfff, 8);
        assert_eq!(entry.mode, EXECUTABLE_MODE);
        assert_eq!(entry.size, 0);
    }

    #[test]
    fn executable_needs_every_execute_bit() {
        assert_eq!(mode_for_stat(&stat(0o100755, 0)), EXECUTABLE_MODE);
        assert_eq!(mode_for_stat(&stat(0o100744, 0)), REGULAR_MODE);
        assert_eq!(mode_for_stat(&stat(0o100644, 0)), REGULAR_MODE);
    }

    #[test]
    fn stat_and_time_matching() {
        let s = stat(0o100644, 5);
        let mut entry = IndexEntry::new("f", ObjectId::from_bytes(b"x"), &s);
        assert!(entry.stat_match(&s));
        assert!(entry.times_match(&s));

        assert!(!entry.stat_match(&stat(0o100644, 6)));
        assert!(!entry.stat_match(&stat(0o100755, 5)));

        entry.size = 0;
        assert!(entry.stat_match(&stat(0o100644, 99)));

        let mut later = s;
        later.mtime_nsec += 1;
        assert!(!entry.times_match(&later));
        entry.update_stat(&later);
        assert!(entry.times_match(&later));
    }

    #[test]
    fn parent_directories_shallowest_first() {
        let entry = IndexEntry::new("a/b/c.txt", ObjectId::from_bytes(b"x"), &stat(0o100644, 0));
        assert_eq!(entry.parent_directories(), vec!["a", "a/b"]);
        assert_eq!(entry.basename(), "c.txt");
        assert!(parent_directories("top").is_empty());
    }
}
