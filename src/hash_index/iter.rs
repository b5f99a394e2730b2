//! Lookup iterator over a bucket chain

use std::iter::FusedIterator;

use parking_lot::RwLockReadGuard;

use crate::error::Result;
use crate::storage::layout::Geometry;
use crate::storage::{DiskFile, StorageFile};

use super::bucket::Bucket;

/// IDs stored under one hash code
///
/// Holds the shared side of the hash index structure lock until the chain
/// is exhausted, an error is returned, or the iterator is dropped. Every ID
/// is only a candidate: distinct values may share a hash.
pub struct CandidateIds<'a, F: StorageFile = DiskFile> {
    walk: Option<ChainWalk<'a, F>>,
}

struct ChainWalk<'a, F: StorageFile> {
    file: &'a F,
    geometry: RwLockReadGuard<'a, Geometry>,
    bucket: Bucket,
    next_slot: usize,
    hash: i32,
}

impl<'a, F: StorageFile> CandidateIds<'a, F> {
    /// An iterator that yields nothing and holds no lock
    pub(crate) fn empty() -> Self {
        Self { walk: None }
    }

    /// Start at the already loaded primary bucket
    pub(crate) fn new(
        file: &'a F,
        geometry: RwLockReadGuard<'a, Geometry>,
        bucket: Bucket,
        hash: i32,
    ) -> Self {
        Self {
            walk: Some(ChainWalk {
                file,
                geometry,
                bucket,
                next_slot: 0,
                hash,
            }),
        }
    }

    /// True while the structure lock is still held
    pub fn holds_lock(&self) -> bool {
        self.walk.is_some()
    }
}

impl<'a, F: StorageFile> ChainWalk<'a, F> {
    fn next_in_bucket(&mut self) -> Option<u32> {
        while self.next_slot < self.bucket.bucket_size() {
            let (hash, id) = self.bucket.slot(self.next_slot);
            self.next_slot += 1;
            if id != 0 && hash == self.hash {
                return Some(id);
            }
        }
        None
    }

    /// Load the overflow bucket; false at the end of the chain
    fn advance(&mut self) -> Result<bool> {
        let overflow = self.bucket.overflow();
        if overflow == 0 {
            return Ok(false);
        }

        let offset = self.geometry.overflow_bucket_offset(overflow);
        self.bucket.load(self.file, offset)?;
        self.next_slot = 0;
        Ok(true)
    }
}

impl<'a, F: StorageFile> Iterator for CandidateIds<'a, F> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let walk = self.walk.as_mut()?;
            if let Some(id) = walk.next_in_bucket() {
                return Some(Ok(id));
            }

            match walk.advance() {
                Ok(true) => continue,
                Ok(false) => {
                    self.walk = None;
                    return None;
                }
                Err(e) => {
                    self.walk = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<'a, F: StorageFile> FusedIterator for CandidateIds<'a, F> {}
