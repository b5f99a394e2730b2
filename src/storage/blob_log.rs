//! Blob Log
//!
//! Append-only file of length-prefixed byte records. A record's offset is
//! its durable address; records are never rewritten in place.

use std::path::Path;

use bytes::Buf;
use tracing::warn;

use crate::error::{Result, StoreError};

use super::file::{DiskFile, StorageFile};
use super::layout::{self, FileKind, BLOB_HEADER_LEN, BLOB_LEN_PREFIX};

/// Bytes read back from the blob log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blob {
    /// The record's length prefix was valid
    Intact(Vec<u8>),
    /// The length prefix was unusable; the bytes were reconstructed from the
    /// distance to the next record and may be wrong
    Recovered(Vec<u8>),
}

impl Blob {
    pub fn is_recovered(&self) -> bool {
        matches!(self, Blob::Recovered(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Blob::Intact(bytes) | Blob::Recovered(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Blob::Intact(bytes) | Blob::Recovered(bytes) => bytes,
        }
    }

    /// The bytes only if they were read intact
    pub fn into_intact(self) -> Option<Vec<u8>> {
        match self {
            Blob::Intact(bytes) => Some(bytes),
            Blob::Recovered(_) => None,
        }
    }
}

/// Append-only data file
///
/// `append` writes at the current end of file and is not safe to call from
/// two threads at once; the value store serializes its writers. Reads are
/// positioned and may run concurrently with an append.
pub struct BlobLog<F: StorageFile = DiskFile> {
    file: F,
    force_sync: bool,
}

impl BlobLog<DiskFile> {
    /// Open or create a blob log at `path`
    pub fn open(path: &Path, force_sync: bool) -> Result<Self> {
        Self::from_file(DiskFile::open(path)?, force_sync)
    }
}

impl<F: StorageFile> BlobLog<F> {
    /// Wrap an open file, writing the header if it is empty
    pub fn from_file(file: F, force_sync: bool) -> Result<Self> {
        let file_len = file.len()?;

        if file_len == 0 {
            let mut header = Vec::with_capacity(BLOB_HEADER_LEN as usize);
            layout::encode_tag(FileKind::BlobLog, &mut header);
            file.write_all_at(&header, 0)?;
        } else {
            let mut header = [0u8; BLOB_HEADER_LEN as usize];
            let n = file.read_at(&mut header, 0)?;
            layout::check_tag(FileKind::BlobLog, file.path(), &header[..n], file_len)?;
        }

        Ok(Self { file, force_sync })
    }

    /// Append a record and return the offset of its length prefix
    pub fn append(&self, data: &[u8]) -> Result<u64> {
        if data.len() > i32::MAX as usize {
            return Err(StoreError::ValueTooLarge(data.len()));
        }

        let offset = self.file.len()?;

        let mut record = Vec::with_capacity(BLOB_LEN_PREFIX as usize + data.len());
        record.extend_from_slice(&(data.len() as i32).to_be_bytes());
        record.extend_from_slice(data);
        self.file.write_all_at(&record, offset)?;

        Ok(offset)
    }

    /// Read the record at `offset`, failing on an invalid length prefix
    pub fn read(&self, offset: u64) -> Result<Vec<u8>> {
        // Without a boundary nothing can come back as Recovered
        self.read_record(offset, None).map(Blob::into_bytes)
    }

    /// Read the record at `offset`
    ///
    /// `boundary` is the offset of the following record (or the end of the
    /// file). When given and the length prefix runs past the end of the file,
    /// the record is reconstructed as everything up to the boundary and
    /// returned as [`Blob::Recovered`].
    pub fn read_record(&self, offset: u64, boundary: Option<u64>) -> Result<Blob> {
        let file_len = self.file.len()?;
        if offset < BLOB_HEADER_LEN || offset + BLOB_LEN_PREFIX > file_len {
            return Err(StoreError::Corrupt(format!(
                "blob offset {} outside {} ({} bytes)",
                offset,
                self.file.path().display(),
                file_len
            )));
        }

        let mut prefix = [0u8; BLOB_LEN_PREFIX as usize];
        self.file.read_exact_at(&mut prefix, offset)?;
        let data_len = (&prefix[..]).get_i32();
        let data_start = offset + BLOB_LEN_PREFIX;

        if data_len >= 0 && data_start + data_len as u64 <= file_len {
            let mut data = vec![0u8; data_len as usize];
            self.file.read_exact_at(&mut data, data_start)?;
            return Ok(Blob::Intact(data));
        }

        match boundary {
            Some(end) if end >= data_start && end <= file_len => {
                let mut data = vec![0u8; (end - data_start) as usize];
                self.file.read_exact_at(&mut data, data_start)?;
                warn!(
                    offset,
                    stored_len = data_len,
                    recovered_len = data.len(),
                    "recovered blob record with invalid length prefix"
                );
                Ok(Blob::Recovered(data))
            }
            _ => Err(StoreError::Corrupt(format!(
                "invalid record length {} at offset {} in {} ({} bytes)",
                data_len,
                offset,
                self.file.path().display(),
                file_len
            ))),
        }
    }

    /// Current file length, header included
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.len()?)
    }

    /// True when the log holds no records
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? <= BLOB_HEADER_LEN)
    }

    /// Iterate over all records from the header to the end of file
    ///
    /// Each call starts a fresh pass.
    pub fn iter(&self) -> Result<BlobIter<'_, F>> {
        Ok(BlobIter {
            log: self,
            position: BLOB_HEADER_LEN,
            end: self.file.len()?,
        })
    }

    /// Discard every record
    pub fn clear(&self) -> Result<()> {
        self.file.set_len(BLOB_HEADER_LEN)?;
        Ok(())
    }

    /// Flush pending writes when force-sync is enabled
    pub fn sync(&self) -> Result<()> {
        if self.force_sync {
            self.file.sync(false)?;
        }
        Ok(())
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Release the file handle
    pub fn close(self) -> Result<()> {
        drop(self.file);
        Ok(())
    }
}

/// Forward pass over the records of a blob log
///
/// Yields `(offset, bytes)`. A record that does not fit in the file (a torn
/// trailing write) yields one error and ends the pass.
pub struct BlobIter<'a, F: StorageFile = DiskFile> {
    log: &'a BlobLog<F>,
    /// Next record offset
    position: u64,
    /// File length when the pass started
    end: u64,
}

impl<'a, F: StorageFile> Iterator for BlobIter<'a, F> {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.end {
            return None;
        }

        let offset = self.position;
        if offset + BLOB_LEN_PREFIX > self.end {
            self.position = self.end;
            return Some(Err(StoreError::Corrupt(format!(
                "truncated length prefix at offset {}",
                offset
            ))));
        }

        let mut prefix = [0u8; BLOB_LEN_PREFIX as usize];
        if let Err(e) = self.log.file.read_exact_at(&mut prefix, offset) {
            self.position = self.end;
            return Some(Err(StoreError::Io(e)));
        }

        let data_len = (&prefix[..]).get_i32();
        let data_start = offset + BLOB_LEN_PREFIX;
        if data_len < 0 || data_start + data_len as u64 > self.end {
            self.position = self.end;
            return Some(Err(StoreError::Corrupt(format!(
                "record at offset {} claims {} bytes past end of file",
                offset, data_len
            ))));
        }

        let mut data = vec![0u8; data_len as usize];
        if let Err(e) = self.log.file.read_exact_at(&mut data, data_start) {
            self.position = self.end;
            return Some(Err(StoreError::Io(e)));
        }

        self.position = data_start + data_len as u64;
        Some(Ok((offset, data)))
    }
}
