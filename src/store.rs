//! Value Store
//!
//! Composes the blob log, offset index and hash index into a deduplicating
//! interning store.
//!
//! ## Responsibilities
//! - Assign dense IDs (1, 2, 3, …) to distinct byte values
//! - Resolve bytes → ID through the hash index, confirmed byte-for-byte
//! - Resolve ID → bytes through the offset index and blob log
//! - Keep the three files cleared, synced and closed together

use std::fs;
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use tracing::{info, trace, warn};

use crate::cache::ValueCaches;
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::hash::{ContentHasher, Crc32Hasher};
use crate::hash_index::HashIndex;
use crate::storage::{Blob, BlobLog, OffsetIndex, UNSET_OFFSET};

/// Persistent, deduplicating value store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (store_data/clear/close/rebuild): serialized by `write_lock`,
///   so blob log and offset index appends never interleave
/// - **Reads** (get_data/get_id): take only the shared side of `files`;
///   the hash index keeps its own structure lock for grows
///
/// ## Write ordering
///
/// `store_data` appends to the blob log, then the offset index, then the
/// hash index. A crash in between leaves either an unreferenced record or
/// an ID whose value cannot be found by content; `rebuild_hash_index`
/// repairs the latter.
pub struct ValueStore<H: ContentHasher = Crc32Hasher> {
    config: Config,
    hasher: H,

    /// `None` once closed
    files: RwLock<Option<Files>>,

    /// Serializes write operations
    write_lock: Mutex<()>,

    /// Recently used ID ↔ value pairs; filled only while `files` is held
    caches: ValueCaches,
}

struct Files {
    hashes: HashIndex,
    offsets: OffsetIndex,
    blobs: BlobLog,
}

/// Result of [`ValueStore::check_consistency`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// IDs examined
    pub checked: u32,
    /// IDs whose record could not be read
    pub unreadable: Vec<u32>,
    /// IDs whose record was reconstructed
    pub recovered: Vec<u32>,
    /// `(id, found)` where a content lookup did not return `id`
    pub mismatched: Vec<(u32, Option<u32>)>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.unreadable.is_empty() && self.recovered.is_empty() && self.mismatched.is_empty()
    }
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub max_id: u32,
    pub hash_items: u32,
    pub bucket_count: u32,
    pub blob_log_bytes: u64,
    pub bloom_active: bool,
}

impl ValueStore<Crc32Hasher> {
    /// Open or create a store with the given config
    pub fn open(config: Config) -> Result<Self> {
        Self::with_hasher(config, Crc32Hasher)
    }

    /// Open `{dir}/{file_prefix}.{dat,id,hash}` with default settings otherwise
    pub fn open_dir(dir: impl AsRef<Path>, file_prefix: &str, force_sync: bool) -> Result<Self> {
        let config = Config::builder()
            .data_dir(dir.as_ref())
            .file_prefix(file_prefix)
            .force_sync(force_sync)
            .build();
        Self::open(config)
    }
}

impl<H: ContentHasher> ValueStore<H> {
    /// Open or create a store that hashes values with `hasher`
    ///
    /// The hasher must be the one the files were written with.
    pub fn with_hasher(config: Config, hasher: H) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let blobs = BlobLog::open(&config.data_path(), config.force_sync)?;
        let offsets = OffsetIndex::open(&config.id_path(), config.force_sync)?;
        let hashes = HashIndex::open(&config.hash_path(), config.force_sync, config.hash_initial_size)?;

        info!(
            dir = %config.dir().display(),
            prefix = %config.file_prefix,
            max_id = offsets.max_id()?,
            buckets = hashes.bucket_count(),
            bloom = hashes.bloom_active(),
            "value store opened"
        );

        let caches = ValueCaches::new(config.value_cache_size, config.id_cache_size);

        Ok(Self {
            config,
            hasher,
            files: RwLock::new(Some(Files {
                hashes,
                offsets,
                blobs,
            })),
            write_lock: Mutex::new(()),
            caches,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Bytes stored under `id`, or `None` if the ID was never assigned
    ///
    /// A record that could only be reconstructed is reported as
    /// [`StoreError::Corrupt`]; use [`read_data`](Self::read_data) to get it.
    pub fn get_data(&self, id: u32) -> Result<Option<Vec<u8>>> {
        match self.read_data(id)? {
            Some(Blob::Intact(bytes)) => Ok(Some(bytes)),
            Some(Blob::Recovered(_)) => Err(StoreError::Corrupt(format!(
                "value {} has an invalid length prefix and was only recovered",
                id
            ))),
            None => Ok(None),
        }
    }

    /// Like [`get_data`](Self::get_data) but returns recovered records
    /// tagged as [`Blob::Recovered`]
    pub fn read_data(&self, id: u32) -> Result<Option<Blob>> {
        if id == 0 {
            return Err(StoreError::InvalidId(id));
        }

        let guard = self.files.read();
        let files = guard.as_ref().ok_or(StoreError::Closed)?;

        if let Some(bytes) = self.caches.value(id) {
            trace!(id, "value cache hit");
            return Ok(Some(Blob::Intact(bytes)));
        }

        let blob = files.read_blob(id, self.config.recover_corrupt_data)?;
        if let Some(Blob::Intact(bytes)) = &blob {
            self.caches.insert_value(id, bytes);
        }
        Ok(blob)
    }

    /// ID of the stored value equal to `data`, if any
    pub fn get_id(&self, data: &[u8]) -> Result<Option<u32>> {
        let guard = self.files.read();
        let files = guard.as_ref().ok_or(StoreError::Closed)?;

        if let Some(id) = self.caches.id(data) {
            trace!(id, "ID cache hit");
            return Ok(Some(id));
        }

        let found = files.find_id(self.hasher.hash(data), data, self.config.recover_corrupt_data)?;
        if let Some(id) = found {
            self.caches.insert_id(data, id);
        }
        Ok(found)
    }

    /// Highest assigned ID, 0 when empty
    pub fn max_id(&self) -> Result<u32> {
        let guard = self.files.read();
        let files = guard.as_ref().ok_or(StoreError::Closed)?;
        files.offsets.max_id()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Return the ID of `data`, storing it first if it is new
    pub fn store_data(&self, data: &[u8]) -> Result<u32> {
        let _write_guard = self.write_lock.lock();
        let guard = self.files.read();
        let files = guard.as_ref().ok_or(StoreError::Closed)?;

        if let Some(id) = self.caches.id(data) {
            trace!(id, len = data.len(), "value already stored (cached)");
            return Ok(id);
        }

        let hash = self.hasher.hash(data);
        if let Some(id) = files.find_id(hash, data, self.config.recover_corrupt_data)? {
            trace!(id, len = data.len(), "value already stored");
            self.caches.insert_id(data, id);
            return Ok(id);
        }

        // Step 1: record bytes
        let offset = files.blobs.append(data)?;

        // Step 2: allocate the ID
        let id = files.offsets.append_offset(offset)?;

        // Step 3: make it discoverable by content
        files.hashes.insert(hash, id)?;
        self.caches.insert(id, data);

        trace!(id, offset, len = data.len(), "value stored");
        Ok(id)
    }

    /// Flush headers and, with force-sync, fsync all three files
    pub fn sync(&self) -> Result<()> {
        let guard = self.files.read();
        let files = guard.as_ref().ok_or(StoreError::Closed)?;
        files.sync()
    }

    /// Discard every value; the next stored value gets ID 1
    ///
    /// Takes the exclusive side of `files` so no reader can put a pre-clear
    /// entry back into the caches.
    pub fn clear(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let guard = self.files.write();
        let files = guard.as_ref().ok_or(StoreError::Closed)?;

        self.caches.clear();
        files.hashes.clear()?;
        files.offsets.clear()?;
        files.blobs.clear()?;

        info!(prefix = %self.config.file_prefix, "value store cleared");
        Ok(())
    }

    /// Sync and release the files; later calls are no-ops
    pub fn close(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        let files = match self.files.write().take() {
            Some(files) => files,
            None => return Ok(()),
        };

        self.caches.clear();
        let synced = files.sync();
        files.close()?;
        synced?;

        info!(prefix = %self.config.file_prefix, "value store closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.files.read().is_none()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Verify that every ID is readable and is found again by its content
    pub fn check_consistency(&self) -> Result<ConsistencyReport> {
        let guard = self.files.read();
        let files = guard.as_ref().ok_or(StoreError::Closed)?;
        let recover = self.config.recover_corrupt_data;

        let mut report = ConsistencyReport::default();
        let max_id = files.offsets.max_id()?;

        for id in 1..=max_id {
            report.checked += 1;

            let blob = match files.read_blob(id, recover) {
                Ok(Some(blob)) => blob,
                Ok(None) | Err(StoreError::Corrupt(_)) => {
                    warn!(id, "value cannot be read");
                    report.unreadable.push(id);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if blob.is_recovered() {
                report.recovered.push(id);
            }

            let data = blob.as_bytes();
            let found = files.find_id(self.hasher.hash(data), data, recover)?;
            if found != Some(id) {
                warn!(id, ?found, "content lookup does not return the value's ID");
                report.mismatched.push((id, found));
            }
        }

        Ok(report)
    }

    /// Rebuild the hash index from the offset index and blob log
    ///
    /// Returns the number of IDs indexed. Unreadable records are skipped.
    pub fn rebuild_hash_index(&self) -> Result<u32> {
        let _write_guard = self.write_lock.lock();
        let guard = self.files.read();
        let files = guard.as_ref().ok_or(StoreError::Closed)?;
        let recover = self.config.recover_corrupt_data;

        files.hashes.clear()?;

        let mut indexed = 0;
        for id in 1..=files.offsets.max_id()? {
            match files.read_blob(id, recover) {
                Ok(Some(blob)) => {
                    files.hashes.insert(self.hasher.hash(blob.as_bytes()), id)?;
                    indexed += 1;
                }
                Ok(None) | Err(StoreError::Corrupt(_)) => warn!(id, "skipping unreadable value"),
                Err(e) => return Err(e),
            }
        }

        files.hashes.sync()?;
        info!(indexed, buckets = files.hashes.bucket_count(), "hash index rebuilt");
        Ok(indexed)
    }

    /// Current counters
    pub fn stats(&self) -> Result<StoreStats> {
        let guard = self.files.read();
        let files = guard.as_ref().ok_or(StoreError::Closed)?;

        Ok(StoreStats {
            max_id: files.offsets.max_id()?,
            hash_items: files.hashes.item_count(),
            bucket_count: files.hashes.bucket_count(),
            blob_log_bytes: files.blobs.len()?,
            bloom_active: files.hashes.bloom_active(),
        })
    }

    /// Visit every record of the blob log in file order, including records
    /// no ID refers to
    pub fn scan_blob_log(&self, mut visit: impl FnMut(u64, &[u8])) -> Result<()> {
        let guard = self.files.read();
        let files = guard.as_ref().ok_or(StoreError::Closed)?;

        for record in files.blobs.iter()? {
            let (offset, data) = record?;
            visit(offset, &data);
        }
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<H: ContentHasher> Drop for ValueStore<H> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close value store cleanly");
        }
    }
}

// =============================================================================
// Files
// =============================================================================

impl Files {
    fn read_blob(&self, id: u32, recover: bool) -> Result<Option<Blob>> {
        let offset = self.offsets.get_offset(id)?;
        if offset == UNSET_OFFSET {
            return Ok(None);
        }

        let boundary = if recover {
            Some(self.record_boundary(id)?)
        } else {
            None
        };
        self.blobs.read_record(offset, boundary).map(Some)
    }

    /// Offset of the record after `id`'s, or the end of the blob log
    fn record_boundary(&self, id: u32) -> Result<u64> {
        if id < self.offsets.max_id()? {
            let next = self.offsets.get_offset(id + 1)?;
            if next != UNSET_OFFSET {
                return Ok(next);
            }
        }
        self.blobs.len()
    }

    fn find_id(&self, hash: i32, data: &[u8], recover: bool) -> Result<Option<u32>> {
        for candidate in self.hashes.lookup(hash)? {
            let id = candidate?;
            if let Some(stored) = self.read_blob(id, recover)? {
                if stored.as_bytes() == data {
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }

    fn sync(&self) -> Result<()> {
        self.blobs.sync()?;
        self.offsets.sync()?;
        self.hashes.sync()
    }

    /// Hash index first, so a failure leaves the primary data untouched
    fn close(self) -> Result<()> {
        let Files {
            hashes,
            offsets,
            blobs,
        } = self;

        hashes.close()?;
        offsets.close()?;
        blobs.close()
    }
}
