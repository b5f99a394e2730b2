//! Hash Index
//!
//! On-disk hash table from 32-bit content hash to candidate value IDs.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::storage::layout::{self, FileKind, Geometry, HashHeader, HASH_HEADER_LEN, HASH_ITEM_SIZE};
use crate::storage::{DiskFile, StorageFile};

use super::bloom::{BloomBits, DEFAULT_BLOOM_BITS};
use super::bucket::Bucket;
use super::iter::CandidateIds;

/// Upper bound for one zero-fill write
const ZERO_FILL_CHUNK: u64 = 64 * 1024;

/// Bucket-chained hash table stored in a single file
///
/// ## Concurrency:
/// - `structure`: read side held by inserts and lookups, write side by grow
///   and clear, so the table shape never changes under a reader
/// - `insert_lock`: serializes inserts (slot allocation is read-then-write)
/// - `item_count`: atomic, persisted to the header on sync/grow/clear
pub struct HashIndex<F: StorageFile = DiskFile> {
    file: F,
    force_sync: bool,

    /// Current shape; guards against concurrent structural changes
    structure: RwLock<Geometry>,

    /// Shape restored by `clear`
    initial: Geometry,

    item_count: AtomicU32,

    insert_lock: Mutex<()>,

    /// Present only when the table was empty at open
    bloom: Option<BloomBits>,
}

impl HashIndex<DiskFile> {
    /// Open or create a hash index at `path`
    ///
    /// `initial_size` only shapes a new table; an existing file keeps the
    /// geometry recorded in its header.
    pub fn open(path: &Path, force_sync: bool, initial_size: u32) -> Result<Self> {
        Self::from_file(DiskFile::open(path)?, force_sync, initial_size)
    }
}

impl<F: StorageFile> HashIndex<F> {
    /// Wrap an open file, initializing an empty table if the file is empty
    pub fn from_file(file: F, force_sync: bool, initial_size: u32) -> Result<Self> {
        let initial = Geometry::for_initial_size(initial_size);
        let file_len = file.len()?;

        let header = if file_len == 0 {
            let header = HashHeader {
                geometry: initial,
                item_count: 0,
            };
            file.write_all_at(&header.encode(), 0)?;
            write_empty_buckets(&file, HASH_HEADER_LEN, initial.bucket_count, &initial)?;
            if force_sync {
                file.sync(false)?;
            }
            header
        } else {
            let mut raw = [0u8; HASH_HEADER_LEN as usize];
            let n = file.read_at(&mut raw, 0)?;
            layout::check_tag(FileKind::HashIndex, file.path(), &raw[..n], file_len)?;
            let header = HashHeader::decode(&raw)?;

            if file_len < header.geometry.primary_end() {
                return Err(StoreError::Corrupt(format!(
                    "hash index {} is {} bytes but its header needs {}",
                    file.path().display(),
                    file_len,
                    header.geometry.primary_end()
                )));
            }
            header
        };

        // The bit set is only trustworthy if it saw every insert, so a file
        // that already holds items is never given one. Lookups on such a
        // table always read the bucket from disk.
        let bloom = (header.item_count == 0)
            .then(|| BloomBits::new((initial_size as usize).max(DEFAULT_BLOOM_BITS)));

        Ok(Self {
            file,
            force_sync,
            structure: RwLock::new(header.geometry),
            initial,
            item_count: AtomicU32::new(header.item_count),
            insert_lock: Mutex::new(()),
            bloom,
        })
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Candidate IDs stored under `hash`, in insertion order per bucket
    pub fn lookup(&self, hash: i32) -> Result<CandidateIds<'_, F>> {
        if let Some(bloom) = &self.bloom {
            if !bloom.may_contain(hash) {
                return Ok(CandidateIds::empty());
            }
        }

        let geometry = self.structure.read();
        let mut bucket = Bucket::empty(&geometry);
        bucket.load(&self.file, geometry.bucket_offset(hash))?;

        Ok(CandidateIds::new(&self.file, geometry, bucket, hash))
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Store `id` under `hash`, doubling the table once the load factor is reached
    pub fn insert(&self, hash: i32, id: u32) -> Result<()> {
        if id == 0 || id > i32::MAX as u32 {
            return Err(StoreError::InvalidId(id));
        }

        let _writer = self.insert_lock.lock();

        let threshold = {
            let geometry = self.structure.read();
            if self.item_count.load(Ordering::SeqCst) == 0 {
                // The count on disk turns non-zero before the first slot does,
                // so a reopened table never trusts an empty bit set
                self.write_header_with_count(&geometry, 1)?;
            }
            if let Some(bloom) = &self.bloom {
                bloom.insert(hash);
            }
            self.store_in_chain(&geometry, geometry.bucket_offset(hash), hash, id)?;
            geometry.grow_threshold()
        };

        let item_count = self.item_count.fetch_add(1, Ordering::SeqCst) + 1;
        if item_count as f64 >= threshold {
            let mut geometry = self.structure.write();
            self.grow(&mut geometry)?;
        }

        Ok(())
    }

    /// Put `(hash, id)` into the first empty slot of the chain starting at
    /// `bucket_offset`, appending an overflow bucket when the chain is full
    fn store_in_chain(&self, geometry: &Geometry, mut bucket_offset: u64, hash: i32, id: u32) -> Result<()> {
        let mut bucket = Bucket::empty(geometry);

        loop {
            bucket.load(&self.file, bucket_offset)?;

            if let Some(slot) = bucket.first_empty_slot() {
                let item_offset = bucket_offset + (slot * HASH_ITEM_SIZE) as u64;
                self.file.write_all_at(&Bucket::encode_item(hash, id), item_offset)?;
                return Ok(());
            }

            let mut overflow = bucket.overflow();
            if overflow == 0 {
                overflow = self.create_overflow_bucket(geometry)?;
                let pointer_offset = bucket_offset + geometry.overflow_pointer_pos() as u64;
                self.file.write_all_at(&(overflow as i32).to_be_bytes(), pointer_offset)?;
            }

            bucket_offset = geometry.overflow_bucket_offset(overflow);
        }
    }

    fn create_overflow_bucket(&self, geometry: &Geometry) -> Result<u32> {
        let (overflow_id, offset) = geometry.next_overflow(self.file.len()?);
        write_empty_buckets(&self.file, offset, 1, geometry)?;
        Ok(overflow_id)
    }

    /// Double the bucket count and rehash; caller holds the write side
    fn grow(&self, geometry: &mut Geometry) -> Result<()> {
        let started = Instant::now();
        let old = *geometry;
        let record_size = old.record_size();
        let old_table_end = old.primary_end();
        let old_file_len = self.file.len()?;

        let new_bucket_count = old
            .bucket_count
            .checked_mul(2)
            .filter(|&count| count <= i32::MAX as u32)
            .ok_or_else(|| StoreError::Corrupt(format!("hash index cannot grow past {} buckets", old.bucket_count)))?;

        // Step 1: move overflow buckets out of the way
        let scratch = self.file.scratch()?;
        copy_range(&self.file, old_table_end, old_file_len, &scratch, record_size)?;

        // Step 2: append the new half of the primary table, drop stale overflow data
        write_empty_buckets(&self.file, old_table_end, old.bucket_count, &old)?;
        geometry.bucket_count = new_bucket_count;
        let new = *geometry;
        self.file.set_len(new.primary_end())?;

        // Step 3: split each old bucket. Items leaving bucket `i` all land in
        // bucket `i + old.bucket_count`, so both are written once.
        let mut bucket = Bucket::empty(&new);
        let mut moved = Bucket::empty(&new);
        for index in 0..old.bucket_count {
            let bucket_offset = old.primary_bucket_offset(index);
            bucket.load(&self.file, bucket_offset)?;
            moved.reset();

            let mut changed = false;
            let mut target = None;
            let occupied: Vec<_> = bucket.occupied().collect();
            for (slot, hash, id) in occupied {
                let new_index = new.bucket_index(hash);
                if new_index != index {
                    moved.push(hash, id);
                    bucket.clear_slot(slot);
                    changed = true;
                    target = Some(new_index);
                }
            }

            if let Some(new_index) = target {
                self.file
                    .write_all_at(moved.as_bytes(), new.primary_bucket_offset(new_index))?;
            }

            if bucket.overflow() != 0 {
                bucket.set_overflow(0);
                changed = true;
            }

            if changed {
                self.file.write_all_at(bucket.as_bytes(), bucket_offset)?;
            }
        }

        // Step 4: re-insert everything that lived in overflow buckets
        let scratch_len = scratch.len()?;
        let mut reinserted = 0u64;
        let mut offset = 0;
        while offset + record_size <= scratch_len {
            bucket.load(&scratch, offset)?;
            let occupied: Vec<_> = bucket.occupied().collect();
            for (_, hash, id) in occupied {
                self.store_in_chain(&new, new.bucket_offset(hash), hash, id)?;
                reinserted += 1;
            }
            offset += record_size;
        }

        // Step 5: discard the side file
        scratch.discard()?;
        self.write_header(&new)?;

        debug!(
            old_buckets = old.bucket_count,
            new_buckets = new.bucket_count,
            reinserted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            path = %self.file.path().display(),
            "hash index grown"
        );

        Ok(())
    }

    /// Remove every item and shrink back to the initial shape
    pub fn clear(&self) -> Result<()> {
        let _writer = self.insert_lock.lock();
        let mut geometry = self.structure.write();

        if let Some(bloom) = &self.bloom {
            bloom.clear();
        }

        *geometry = self.initial;
        self.file.set_len(geometry.primary_end())?;
        write_empty_buckets(&self.file, HASH_HEADER_LEN, geometry.bucket_count, &geometry)?;
        self.item_count.store(0, Ordering::SeqCst);
        self.write_header(&geometry)?;

        Ok(())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the header counters; fsync when force-sync is enabled
    pub fn sync(&self) -> Result<()> {
        {
            let geometry = self.structure.read();
            self.write_header(&geometry)?;
        }

        if self.force_sync {
            self.file.sync(false)?;
        }
        Ok(())
    }

    fn write_header(&self, geometry: &Geometry) -> Result<()> {
        self.write_header_with_count(geometry, self.item_count.load(Ordering::SeqCst))
    }

    fn write_header_with_count(&self, geometry: &Geometry, item_count: u32) -> Result<()> {
        let header = HashHeader {
            geometry: *geometry,
            item_count,
        };
        self.file.write_all_at(&header.encode(), 0)?;
        Ok(())
    }

    /// Release the file handle without writing the header
    pub fn close(self) -> Result<()> {
        drop(self.file);
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of stored items
    pub fn item_count(&self) -> u32 {
        self.item_count.load(Ordering::SeqCst)
    }

    /// Number of primary buckets
    pub fn bucket_count(&self) -> u32 {
        self.structure.read().bucket_count
    }

    /// Slots per bucket
    pub fn bucket_size(&self) -> u32 {
        self.structure.read().bucket_size
    }

    /// Whether lookups can be answered from the in-memory bit set
    pub fn bloom_active(&self) -> bool {
        self.bloom.is_some()
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    #[cfg(test)]
    pub(crate) fn into_file(self) -> F {
        self.file
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Zero `count` bucket records starting at `offset`
fn write_empty_buckets<F: StorageFile>(file: &F, offset: u64, count: u32, geometry: &Geometry) -> Result<()> {
    let record_size = geometry.record_size();
    let per_chunk = (ZERO_FILL_CHUNK / record_size).max(1);
    let zeros = vec![0u8; (per_chunk.min(count as u64) * record_size) as usize];

    let mut remaining = count as u64;
    let mut position = offset;
    while remaining > 0 {
        let records = remaining.min(per_chunk);
        let len = (records * record_size) as usize;
        file.write_all_at(&zeros[..len], position)?;
        position += len as u64;
        remaining -= records;
    }
    Ok(())
}

/// Copy `[start, end)` of `src` into the beginning of `dst`
fn copy_range<F: StorageFile>(src: &F, start: u64, end: u64, dst: &F, record_size: u64) -> Result<()> {
    let chunk = (ZERO_FILL_CHUNK / record_size).max(1) * record_size;
    let mut buf = vec![0u8; chunk as usize];

    let mut position = start;
    while position < end {
        let len = chunk.min(end - position) as usize;
        src.read_exact_at(&mut buf[..len], position)?;
        dst.write_all_at(&buf[..len], position - start)?;
        position += len as u64;
    }
    Ok(())
}
