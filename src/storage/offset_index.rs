//! Offset Index
//!
//! Dense array of 8-byte slots mapping a value ID to the blob log offset of
//! its record. The next ID is implied by the file length, so no counter is
//! persisted.

use std::path::Path;

use bytes::Buf;

use crate::error::{Result, StoreError};

use super::file::{DiskFile, StorageFile};
use super::layout::{self, FileKind, OFFSET_HEADER_LEN, OFFSET_SLOT_SIZE};

/// Offset stored in a slot that was never written
pub const UNSET_OFFSET: u64 = 0;

/// ID → blob log offset file
pub struct OffsetIndex<F: StorageFile = DiskFile> {
    file: F,
    force_sync: bool,
}

impl OffsetIndex<DiskFile> {
    /// Open or create an offset index at `path`
    pub fn open(path: &Path, force_sync: bool) -> Result<Self> {
        Self::from_file(DiskFile::open(path)?, force_sync)
    }
}

impl<F: StorageFile> OffsetIndex<F> {
    /// Wrap an open file, writing the header if it is empty
    pub fn from_file(file: F, force_sync: bool) -> Result<Self> {
        let file_len = file.len()?;

        if file_len == 0 {
            let mut header = [0u8; OFFSET_HEADER_LEN as usize];
            layout::encode_tag(FileKind::OffsetIndex, &mut &mut header[..]);
            file.write_all_at(&header, 0)?;
        } else {
            let mut header = [0u8; OFFSET_HEADER_LEN as usize];
            let n = file.read_at(&mut header, 0)?;
            layout::check_tag(FileKind::OffsetIndex, file.path(), &header[..n], file_len)?;
        }

        Ok(Self { file, force_sync })
    }

    /// Store `offset` in the next free slot and return the slot number as
    /// the new ID
    pub fn append_offset(&self, offset: u64) -> Result<u32> {
        let slot = layout::next_slot(self.file.len()?);
        let id = u32::try_from(slot)
            .ok()
            .filter(|&id| id <= i32::MAX as u32)
            .ok_or_else(|| StoreError::Corrupt(format!("value ID space exhausted at slot {}", slot)))?;

        // A torn trailing slot is overwritten rather than appended after
        self.file
            .write_all_at(&(offset as i64).to_be_bytes(), layout::offset_slot_position(id))?;

        Ok(id)
    }

    /// Blob log offset for `id`, or [`UNSET_OFFSET`] when the slot was never written
    pub fn get_offset(&self, id: u32) -> Result<u64> {
        if id == 0 {
            return Err(StoreError::InvalidId(id));
        }

        let position = layout::offset_slot_position(id);
        if position + OFFSET_SLOT_SIZE > self.file.len()? {
            return Ok(UNSET_OFFSET);
        }

        let mut slot = [0u8; OFFSET_SLOT_SIZE as usize];
        self.file.read_exact_at(&mut slot, position)?;
        let offset = (&slot[..]).get_i64();

        if offset < 0 {
            return Err(StoreError::Corrupt(format!(
                "negative offset {} stored for ID {}",
                offset, id
            )));
        }
        Ok(offset as u64)
    }

    /// Overwrite the slot for an already allocated `id`
    pub fn set_offset(&self, id: u32, offset: u64) -> Result<()> {
        if id == 0 || id > self.max_id()? {
            return Err(StoreError::InvalidId(id));
        }

        self.file
            .write_all_at(&(offset as i64).to_be_bytes(), layout::offset_slot_position(id))?;
        Ok(())
    }

    /// Highest allocated ID, 0 for an empty index
    pub fn max_id(&self) -> Result<u32> {
        let slots = layout::next_slot(self.file.len()?);
        Ok(slots.saturating_sub(1) as u32)
    }

    /// Drop every slot
    pub fn clear(&self) -> Result<()> {
        self.file.set_len(OFFSET_HEADER_LEN)?;
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
