//! SHA-1 checksummed reading and writing of the index file.

use sha1::{Digest, Sha1};

use crate::error::{IndexError, IndexResult};

pub const CHECKSUM_SIZE: usize = 20;

/// Reads sequential chunks from an index image while hashing them.
pub struct ChecksumReader<'a> {
    data: &'a [u8],
    offset: usize,
    digest: Sha1,
}

impl<'a> ChecksumReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            digest: Sha1::new(),
        }
    }

    pub fn read(&mut self, size: usize) -> IndexResult<&'a [u8]> {
        let end = self.offset + size;
        if end > self.data.len() {
            return Err(IndexError::CorruptIndex(
                "Unexpected end-of-file while reading index".into(),
            ));
        }
        let chunk = &self.data[self.offset..end];
        self.offset = end;
        self.digest.update(chunk);
        Ok(chunk)
    }

    /// Compare the trailing stored checksum with everything read so far.
    pub fn verify_checksum(self) -> IndexResult<()> {
        let stored = self
            .data
            .get(self.offset..self.offset + CHECKSUM_SIZE)
            .ok_or_else(|| IndexError::CorruptIndex("missing index checksum".into()))?;
        let actual = self.digest.finalize();
        if actual.as_slice() != stored {
            return Err(IndexError::CorruptIndex(format!(
                "Checksum {} does not match value stored on disk: {}",
                hex::encode(actual),
                hex::encode(stored)
            )));
        }
        Ok(())
    }
}

/// Accumulates an index image and appends its checksum.
#[derive(Default)]
pub struct ChecksumWriter {
    buf: Vec<u8>,
    digest: Sha1,
}

impl ChecksumWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, data: &[u8]) {
        self.digest.update(data);
        self.buf.extend_from_slice(data);
    }

    pub fn finish(mut self) -> Vec<u8> {
        let sum = self.digest.finalize();
        self.buf.extend_from_slice(&sum);
        self.buf
    }
}
