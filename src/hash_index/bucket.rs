//! In-memory image of one bucket record

use bytes::{Buf, BufMut};

use crate::storage::layout::{Geometry, HASH_ITEM_SIZE};
use crate::storage::StorageFile;

/// One bucket record: `bucket_size` (hash, id) slots and an overflow pointer
#[derive(Debug, Clone)]
pub(crate) struct Bucket {
    buf: Vec<u8>,
    bucket_size: usize,
}

impl Bucket {
    /// An all-zero bucket for `geometry`
    pub(crate) fn empty(geometry: &Geometry) -> Self {
        Self {
            buf: vec![0u8; geometry.record_size() as usize],
            bucket_size: geometry.bucket_size as usize,
        }
    }

    /// Encode a single slot
    pub(crate) fn encode_item(hash: i32, id: u32) -> [u8; HASH_ITEM_SIZE] {
        let mut item = [0u8; HASH_ITEM_SIZE];
        let mut out = &mut item[..];
        out.put_i32(hash);
        out.put_i32(id as i32);
        item
    }

    /// Replace the contents with the record stored at `offset`
    pub(crate) fn load<F: StorageFile>(&mut self, file: &F, offset: u64) -> std::io::Result<()> {
        file.read_exact_at(&mut self.buf, offset)
    }

    /// Zero every slot and the overflow pointer
    pub(crate) fn reset(&mut self) {
        self.buf.fill(0);
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// `(hash, id)` stored in `slot`; id 0 marks an empty slot
    pub(crate) fn slot(&self, slot: usize) -> (i32, u32) {
        let mut item = &self.buf[slot * HASH_ITEM_SIZE..(slot + 1) * HASH_ITEM_SIZE];
        let hash = item.get_i32();
        let id = item.get_i32();
        (hash, id as u32)
    }

    pub(crate) fn set_slot(&mut self, slot: usize, hash: i32, id: u32) {
        let start = slot * HASH_ITEM_SIZE;
        self.buf[start..start + HASH_ITEM_SIZE].copy_from_slice(&Self::encode_item(hash, id));
    }

    pub(crate) fn clear_slot(&mut self, slot: usize) {
        self.set_slot(slot, 0, 0);
    }

    pub(crate) fn first_empty_slot(&self) -> Option<usize> {
        (0..self.bucket_size).find(|&slot| self.slot(slot).1 == 0)
    }

    /// Store in the first empty slot; false when the bucket is full
    pub(crate) fn push(&mut self, hash: i32, id: u32) -> bool {
        match self.first_empty_slot() {
            Some(slot) => {
                self.set_slot(slot, hash, id);
                true
            }
            None => false,
        }
    }

    /// Occupied slots as `(slot, hash, id)`
    pub(crate) fn occupied(&self) -> impl Iterator<Item = (usize, i32, u32)> + '_ {
        (0..self.bucket_size).filter_map(move |slot| {
            let (hash, id) = self.slot(slot);
            (id != 0).then_some((slot, hash, id))
        })
    }

    /// Overflow bucket ID, 0 for none
    pub(crate) fn overflow(&self) -> u32 {
        let start = self.bucket_size * HASH_ITEM_SIZE;
        (&self.buf[start..start + 4]).get_i32() as u32
    }

    pub(crate) fn set_overflow(&mut self, overflow_id: u32) {
        let start = self.bucket_size * HASH_ITEM_SIZE;
        (&mut self.buf[start..start + 4]).put_i32(overflow_id as i32);
    }
}
