//! Hash Index Module
//!
//! Approximate content → ID lookup. A hit names candidate IDs only; the
//! value store confirms each one against the blob log.
//!
//! ## File Format (big-endian)
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (16 bytes)                                           │
//! │   Magic "nhf" (3) | Version (1) | BucketCount (4)           │
//! │   BucketSize (4)  | ItemCount (4)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Primary buckets (BucketCount records)                       │
//! │   [Hash: i32][ID: i32] × BucketSize | Overflow ID: i32      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Overflow buckets (same record shape, IDs start at 1)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A slot with ID 0 is empty. `hash mod BucketCount` picks the primary
//! bucket; a full chain gets a new overflow bucket appended at the end of
//! the file. Reaching 75% fill doubles BucketCount and rehashes.

mod bloom;
mod bucket;
mod iter;
mod table;

pub use iter::CandidateIds;
pub use table::HashIndex;
