//! On-disk layout
//!
//! Every magic number, header length and offset formula used by the three
//! store files lives here. All multi-byte integers are big-endian.

use std::fmt;
use std::path::Path;

use bytes::{Buf, BufMut};

use crate::error::{Result, StoreError};

// =============================================================================
// File Kinds
// =============================================================================

/// The three files that make up a value store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    BlobLog,
    OffsetIndex,
    HashIndex,
}

impl FileKind {
    /// 3-byte ASCII tag at the start of the file
    pub const fn magic(self) -> &'static [u8; 3] {
        match self {
            FileKind::BlobLog => b"ndf",
            FileKind::OffsetIndex => b"nid",
            FileKind::HashIndex => b"nhf",
        }
    }

    /// Newest format version this build reads and writes
    pub const fn version(self) -> u8 {
        1
    }

    /// Full header length, including any padding
    pub const fn header_len(self) -> u64 {
        match self {
            FileKind::BlobLog => BLOB_HEADER_LEN,
            FileKind::OffsetIndex => OFFSET_HEADER_LEN,
            FileKind::HashIndex => HASH_HEADER_LEN,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::BlobLog => "blob log",
            FileKind::OffsetIndex => "offset index",
            FileKind::HashIndex => "hash index",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Headers
// =============================================================================

/// Magic (3) + Version (1)
pub const BLOB_HEADER_LEN: u64 = 4;

/// Magic (3) + Version (1) + Padding (4); keeps the 8-byte slots aligned
pub const OFFSET_HEADER_LEN: u64 = 8;

/// Magic (3) + Version (1) + BucketCount (4) + BucketSize (4) + ItemCount (4)
pub const HASH_HEADER_LEN: u64 = 16;

/// Length prefix of a blob record
pub const BLOB_LEN_PREFIX: u64 = 4;

/// One offset slot: an i64 blob log offset
pub const OFFSET_SLOT_SIZE: u64 = 8;

/// One hash slot: i32 hash + i32 id
pub const HASH_ITEM_SIZE: usize = 8;

/// Trailing overflow pointer of a bucket record
pub const OVERFLOW_POINTER_SIZE: usize = 4;

/// Slots per bucket in a freshly created hash index
pub const INIT_BUCKET_SIZE: u32 = 8;

/// Largest bucket size whose record length still fits in a `u32`
pub const MAX_BUCKET_SIZE: u32 = (u32::MAX - OVERFLOW_POINTER_SIZE as u32) / HASH_ITEM_SIZE as u32;

/// Fill ratio that triggers a table doubling
pub const LOAD_FACTOR: f64 = 0.75;

/// Encode the 4-byte magic + version prefix shared by all files
pub fn encode_tag(kind: FileKind, out: &mut impl BufMut) {
    out.put_slice(kind.magic());
    out.put_u8(kind.version());
}

/// Validate the magic + version prefix of an existing, non-empty file
pub fn check_tag(kind: FileKind, path: &Path, header: &[u8], file_len: u64) -> Result<()> {
    if file_len < kind.header_len() || header.len() < 4 {
        return Err(StoreError::TooShort {
            kind,
            path: path.to_path_buf(),
            len: file_len,
        });
    }

    if &header[0..3] != kind.magic() {
        return Err(StoreError::BadMagic {
            kind,
            path: path.to_path_buf(),
        });
    }

    let version = header[3];
    if version > kind.version() {
        return Err(StoreError::FutureFormat {
            kind,
            path: path.to_path_buf(),
            version,
        });
    }
    if version != kind.version() {
        return Err(StoreError::InvalidFormatVersion {
            kind,
            path: path.to_path_buf(),
            version,
        });
    }

    Ok(())
}

// =============================================================================
// Offset Index Arithmetic
// =============================================================================

/// File position of the slot for `id`; slot 0 overlaps the header
pub const fn offset_slot_position(id: u32) -> u64 {
    id as u64 * OFFSET_SLOT_SIZE
}

/// Number of the next free slot for a file of `file_len` bytes
pub const fn next_slot(file_len: u64) -> u64 {
    file_len / OFFSET_SLOT_SIZE
}

// =============================================================================
// Hash Index Geometry
// =============================================================================

/// Shape of the hash table; all bucket addressing goes through here
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Number of primary (non-overflow) buckets
    pub bucket_count: u32,
    /// Slots per bucket
    pub bucket_size: u32,
}

impl Geometry {
    /// Geometry of a new table sized for `initial_size` items
    pub fn for_initial_size(initial_size: u32) -> Self {
        Self {
            bucket_count: initial_size.div_ceil(INIT_BUCKET_SIZE).max(1),
            bucket_size: INIT_BUCKET_SIZE,
        }
    }

    /// Bytes in one bucket record: slots + overflow pointer
    pub fn record_size(&self) -> u64 {
        HASH_ITEM_SIZE as u64 * self.bucket_size as u64 + OVERFLOW_POINTER_SIZE as u64
    }

    /// Position of the overflow pointer inside a bucket record
    pub fn overflow_pointer_pos(&self) -> usize {
        HASH_ITEM_SIZE * self.bucket_size as usize
    }

    /// End of the primary bucket region
    pub fn primary_end(&self) -> u64 {
        HASH_HEADER_LEN + self.bucket_count as u64 * self.record_size()
    }

    /// `primary_end` for a geometry read from disk; `None` on overflow
    pub fn checked_primary_end(&self) -> Option<u64> {
        (self.bucket_count as u64)
            .checked_mul(self.record_size())?
            .checked_add(HASH_HEADER_LEN)
    }

    /// Primary bucket number for `hash`, normalized to `[0, bucket_count)`
    pub fn bucket_index(&self, hash: i32) -> u32 {
        (hash as i64).rem_euclid(self.bucket_count as i64) as u32
    }

    /// File offset of the primary bucket for `hash`
    pub fn bucket_offset(&self, hash: i32) -> u64 {
        self.primary_bucket_offset(self.bucket_index(hash))
    }

    /// File offset of primary bucket number `index`
    pub fn primary_bucket_offset(&self, index: u32) -> u64 {
        HASH_HEADER_LEN + index as u64 * self.record_size()
    }

    /// File offset of overflow bucket `overflow_id` (IDs start at 1)
    pub fn overflow_bucket_offset(&self, overflow_id: u32) -> u64 {
        HASH_HEADER_LEN + (self.bucket_count as u64 + overflow_id as u64 - 1) * self.record_size()
    }

    /// ID and file offset for a new overflow bucket in a file of `file_len`
    /// bytes; a torn trailing record is overwritten
    pub fn next_overflow(&self, file_len: u64) -> (u32, u64) {
        let overflow_bytes = file_len.saturating_sub(self.primary_end());
        let existing = overflow_bytes / self.record_size();
        let offset = self.primary_end() + existing * self.record_size();
        (existing as u32 + 1, offset)
    }

    /// Item count at which the table doubles
    pub fn grow_threshold(&self) -> f64 {
        LOAD_FACTOR * self.bucket_count as f64 * self.bucket_size as f64
    }
}

/// Decoded hash index header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashHeader {
    pub geometry: Geometry,
    pub item_count: u32,
}

impl HashHeader {
    pub fn encode(&self) -> [u8; HASH_HEADER_LEN as usize] {
        let mut buf = [0u8; HASH_HEADER_LEN as usize];
        let mut out = &mut buf[..];
        encode_tag(FileKind::HashIndex, &mut out);
        out.put_i32(self.geometry.bucket_count as i32);
        out.put_i32(self.geometry.bucket_size as i32);
        out.put_i32(self.item_count as i32);
        buf
    }

    /// Decode the counters of a header whose tag was already checked
    pub fn decode(header: &[u8]) -> Result<Self> {
        let mut buf = &header[4..HASH_HEADER_LEN as usize];
        let bucket_count = buf.get_i32();
        let bucket_size = buf.get_i32();
        let item_count = buf.get_i32();

        if bucket_count <= 0 || bucket_size <= 0 || item_count < 0 {
            return Err(StoreError::Corrupt(format!(
                "hash index header has invalid geometry: bucket_count={}, bucket_size={}, item_count={}",
                bucket_count, bucket_size, item_count
            )));
        }

        let geometry = Geometry {
            bucket_count: bucket_count as u32,
            bucket_size: bucket_size as u32,
        };
        if geometry.bucket_size > MAX_BUCKET_SIZE || geometry.checked_primary_end().is_none() {
            return Err(StoreError::Corrupt(format!(
                "hash index header geometry is too large: bucket_count={}, bucket_size={}",
                bucket_count, bucket_size
            )));
        }

        Ok(Self {
            geometry,
            item_count: item_count as u32,
        })
    }
}
