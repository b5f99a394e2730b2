//! Storage Module
//!
//! The two append-oriented files under the value store and the file
//! abstraction they share.
//!
//! ## Responsibilities
//! - Persist value bytes as immutable length-prefixed records
//! - Map dense value IDs to record offsets
//! - Validate magic numbers and format versions on open
//!
//! ## File Formats (big-endian)
//! ```text
//! Blob Log ({prefix}.dat)
//! ┌──────────┬──────────┬──────────────┬────────┬──────────────┬─────
//! │Magic (3) │Version(1)│  Len (i32)   │ Bytes  │  Len (i32)   │ ...
//! └──────────┴──────────┴──────────────┴────────┴──────────────┴─────
//!
//! Offset Index ({prefix}.id)
//! ┌──────────┬──────────┬─────────┬──────────────┬──────────────┬─────
//! │Magic (3) │Version(1)│ Pad (4) │ ID 1 (i64)   │ ID 2 (i64)   │ ...
//! └──────────┴──────────┴─────────┴──────────────┴──────────────┴─────
//! ```
//!
//! The hash index format is described in [`crate::hash_index`].

mod blob_log;
mod file;
mod offset_index;

pub(crate) mod layout;

pub use blob_log::{Blob, BlobIter, BlobLog};
pub use file::{DiskFile, StorageFile};
pub use layout::FileKind;
pub use offset_index::{OffsetIndex, UNSET_OFFSET};

#[cfg(test)]
pub(crate) use file::MemFile;
