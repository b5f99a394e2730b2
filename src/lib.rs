//! # ValueStore
//!
//! A persistent, deduplicating value store that interns arbitrary byte
//! values under dense integer IDs:
//! - Append-only blob log holding the value bytes
//! - Offset index mapping ID → blob log offset
//! - On-disk hash index with overflow chaining and doubling growth
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ValueStore                            │
//! │         store_data / get_id / get_data / clear / close       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────────┐
//!          │            │                     │
//!          ▼            ▼                     ▼
//!   ┌─────────────┐ ┌─────────────┐   ┌─────────────┐
//!   │ Hash Index  │ │Offset Index │   │  Blob Log   │
//!   │ hash → IDs  │ │ ID → offset │──▶│ offset →    │
//!   │  ({p}.hash) │ │   ({p}.id)  │   │ bytes ({p}.dat)
//!   └─────────────┘ └─────────────┘   └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use valuestore::{Config, ValueStore};
//!
//! let store = ValueStore::open(Config::builder().data_dir("/tmp/values").build())?;
//! let id = store.store_data(b"alice")?;
//! assert_eq!(store.store_data(b"alice")?, id);
//! assert_eq!(store.get_data(id)?.as_deref(), Some(&b"alice"[..]));
//! store.close()?;
//! # Ok::<(), valuestore::StoreError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod hash;
mod cache;
pub mod storage;
pub mod hash_index;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::Config;
pub use hash::{ContentHasher, Crc32Hasher};
pub use storage::{Blob, FileKind};
pub use store::{ConsistencyReport, StoreStats, ValueStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
