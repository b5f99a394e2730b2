//! Single-hash bit set for definite-miss lookups
//!
//! Bits are atomic so inserts can set them while lookups test them under
//! the shared side of the structure lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of bits (a prime just over 5 MB worth of bits)
pub(crate) const DEFAULT_BLOOM_BITS: usize = 41_943_049;

pub(crate) struct BloomBits {
    words: Box<[AtomicU64]>,
    bits: usize,
}

impl BloomBits {
    pub(crate) fn new(bits: usize) -> Self {
        let bits = bits.max(1);
        let words = (0..bits.div_ceil(64)).map(|_| AtomicU64::new(0)).collect();
        Self { words, bits }
    }

    fn position(&self, hash: i32) -> (usize, u64) {
        let bit = hash.unsigned_abs() as usize % self.bits;
        (bit / 64, 1u64 << (bit % 64))
    }

    pub(crate) fn insert(&self, hash: i32) {
        let (word, mask) = self.position(hash);
        self.words[word].fetch_or(mask, Ordering::Relaxed);
    }

    /// False means `hash` was never inserted since the last clear
    pub(crate) fn may_contain(&self, hash: i32) -> bool {
        let (word, mask) = self.position(hash);
        self.words[word].load(Ordering::Relaxed) & mask != 0
    }

    pub(crate) fn clear(&self) {
        for word in self.words.iter() {
            word.store(0, Ordering::Relaxed);
        }
    }
}
