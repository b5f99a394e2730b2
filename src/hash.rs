//! Content hashing
//!
//! The hash only picks a bucket. Equal hashes never prove equal values.

/// Maps value bytes to a 32-bit bucket key
pub trait ContentHasher: Send + Sync {
    fn hash(&self, data: &[u8]) -> i32;
}

/// CRC32 over the raw bytes, reinterpreted as a signed integer
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Hasher;

impl ContentHasher for Crc32Hasher {
    fn hash(&self, data: &[u8]) -> i32 {
        crc32fast::hash(data) as i32
    }
}
