//! Tests for the on-disk HashIndex
//!
//! These tests verify:
//! - File layout of a new table
//! - Candidate lookups through overflow chains
//! - Doubling growth across several rounds
//! - Header persistence and reopen behaviour
//! - Removal of the rehash scratch file

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use valuestore::hash_index::HashIndex;
use valuestore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

const RECORD_SIZE: u64 = 8 * 8 + 4;

fn setup_temp_table() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("values.hash");
    (temp_dir, path)
}

fn candidates(index: &HashIndex, hash: i32) -> Vec<u32> {
    index.lookup(hash).unwrap().map(|id| id.unwrap()).collect()
}

fn read_header(path: &Path) -> (u32, u32, u32) {
    let bytes = fs::read(path).unwrap();
    assert_eq!(&bytes[0..4], b"nhf\x01");
    let field = |at: usize| u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap());
    (field(4), field(8), field(12))
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_new_table_layout() {
    let (_temp, path) = setup_temp_table();

    let index = HashIndex::open(&path, false, 512).unwrap();

    assert_eq!(index.bucket_count(), 64);
    assert_eq!(index.bucket_size(), 8);
    assert_eq!(index.item_count(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), 16 + 64 * RECORD_SIZE);
    assert_eq!(read_header(&path), (64, 8, 0));
}

#[test]
fn test_initial_size_rounds_up_to_whole_buckets() {
    let (_temp, path) = setup_temp_table();

    let index = HashIndex::open(&path, false, 9).unwrap();

    assert_eq!(index.bucket_count(), 2);
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_lookup_returns_every_id_with_the_hash() {
    let (_temp, path) = setup_temp_table();
    let index = HashIndex::open(&path, false, 512).unwrap();

    index.insert(42, 1).unwrap();
    index.insert(7, 2).unwrap();
    index.insert(42, 3).unwrap();

    assert_eq!(candidates(&index, 42), vec![1, 3]);
    assert_eq!(candidates(&index, 7), vec![2]);
    assert!(candidates(&index, 8).is_empty());
}

#[test]
fn test_negative_hashes_are_supported() {
    let (_temp, path) = setup_temp_table();
    let index = HashIndex::open(&path, false, 512).unwrap();

    index.insert(-1, 1).unwrap();
    index.insert(i32::MIN, 2).unwrap();

    assert_eq!(candidates(&index, -1), vec![1]);
    assert_eq!(candidates(&index, i32::MIN), vec![2]);
}

#[test]
fn test_same_bucket_items_spill_into_overflow() {
    let (_temp, path) = setup_temp_table();
    // 64 buckets, threshold 384: twenty items never trigger a grow
    let index = HashIndex::open(&path, false, 512).unwrap();

    for id in 1..=20 {
        index.insert(64 * id as i32, id).unwrap();
    }

    assert_eq!(index.bucket_count(), 64);
    // Two overflow buckets behind bucket 0
    assert_eq!(fs::metadata(&path).unwrap().len(), 16 + 66 * RECORD_SIZE);
    for id in 1..=20 {
        assert_eq!(candidates(&index, 64 * id as i32), vec![id]);
    }
}

#[test]
fn test_insert_rejects_reserved_id() {
    let (_temp, path) = setup_temp_table();
    let index = HashIndex::open(&path, false, 512).unwrap();

    assert!(matches!(index.insert(1, 0), Err(StoreError::InvalidId(0))));
}

// =============================================================================
// Growth Tests
// =============================================================================

#[test]
fn test_table_doubles_at_load_factor() {
    let (_temp, path) = setup_temp_table();
    let index = HashIndex::open(&path, false, 8).unwrap();

    for id in 1..=5 {
        index.insert(id as i32, id).unwrap();
    }
    assert_eq!(index.bucket_count(), 1);

    index.insert(6, 6).unwrap();

    assert_eq!(index.bucket_count(), 2);
    assert_eq!(read_header(&path), (2, 8, 6));
}

#[test]
fn test_several_doublings_keep_every_item() {
    let (_temp, path) = setup_temp_table();
    let index = HashIndex::open(&path, false, 8).unwrap();

    let hash_of = |id: u32| (id.wrapping_mul(2_654_435_761)) as i32;
    for id in 1..=500 {
        index.insert(hash_of(id), id).unwrap();
    }

    assert!(index.bucket_count() >= 64);
    assert_eq!(index.item_count(), 500);
    for id in 1..=500 {
        assert!(candidates(&index, hash_of(id)).contains(&id), "lost id {}", id);
    }
}

#[test]
fn test_grow_with_long_chains_keeps_every_item() {
    let (_temp, path) = setup_temp_table();
    let index = HashIndex::open(&path, false, 8).unwrap();

    // Hashes that stay together for several doublings build long chains
    for id in 1..=40 {
        index.insert((id as i32 % 4) * 1024, id).unwrap();
    }

    for residue in 0..4 {
        let expected: Vec<u32> = (1..=40).filter(|id| id % 4 == residue).collect();
        let mut found = candidates(&index, residue as i32 * 1024);
        found.sort_unstable();
        assert_eq!(found, expected);
    }
}

#[test]
fn test_grow_removes_scratch_file() {
    let (temp, path) = setup_temp_table();
    let index = HashIndex::open(&path, false, 8).unwrap();

    for id in 1..=30 {
        index.insert(0, id).unwrap();
    }

    assert!(index.bucket_count() > 1);
    assert!(!temp.path().join("rehash_values.hash").exists());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_items_survive_reopen() {
    let (_temp, path) = setup_temp_table();
    {
        let index = HashIndex::open(&path, false, 8).unwrap();
        for id in 1..=50 {
            index.insert(id as i32 * 3, id).unwrap();
        }
        index.sync().unwrap();
        index.close().unwrap();
    }

    let index = HashIndex::open(&path, false, 8).unwrap();

    assert_eq!(index.item_count(), 50);
    assert!(!index.bloom_active());
    for id in 1..=50 {
        assert_eq!(candidates(&index, id as i32 * 3), vec![id]);
    }
    assert!(candidates(&index, 1).is_empty());
}

#[test]
fn test_reopen_keeps_stored_geometry() {
    let (_temp, path) = setup_temp_table();
    {
        let index = HashIndex::open(&path, false, 8).unwrap();
        for id in 1..=20 {
            index.insert(id as i32, id).unwrap();
        }
        index.sync().unwrap();
    }

    // A different initial size does not reshape an existing table
    let index = HashIndex::open(&path, false, 4096).unwrap();

    assert_eq!(index.bucket_count(), 4);
}

#[test]
fn test_first_insert_persists_non_zero_count() {
    let (_temp, path) = setup_temp_table();
    {
        let index = HashIndex::open(&path, false, 64).unwrap();
        index.insert(5, 1).unwrap();
        // No sync
    }

    let index = HashIndex::open(&path, false, 64).unwrap();

    assert!(!index.bloom_active());
    assert_eq!(candidates(&index, 5), vec![1]);
}

#[test]
fn test_empty_table_gets_bloom_on_reopen() {
    let (_temp, path) = setup_temp_table();
    {
        let index = HashIndex::open(&path, false, 64).unwrap();
        assert!(index.bloom_active());
    }

    let index = HashIndex::open(&path, false, 64).unwrap();

    assert!(index.bloom_active());
}

#[test]
fn test_clear_restores_initial_geometry() {
    let (_temp, path) = setup_temp_table();
    let index = HashIndex::open(&path, false, 8).unwrap();
    for id in 1..=30 {
        index.insert(id as i32, id).unwrap();
    }

    index.clear().unwrap();

    assert_eq!(index.bucket_count(), 1);
    assert_eq!(index.item_count(), 0);
    assert_eq!(read_header(&path), (1, 8, 0));
    assert_eq!(fs::metadata(&path).unwrap().len(), 16 + RECORD_SIZE);
    assert!(candidates(&index, 3).is_empty());
}

#[test]
fn test_truncated_table_is_rejected() {
    let (_temp, path) = setup_temp_table();
    {
        HashIndex::open(&path, false, 512).unwrap();
    }
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..100]).unwrap();

    let err = HashIndex::open(&path, false, 512).err().unwrap();

    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[test]
fn test_header_shorter_than_tag_is_rejected() {
    let (_temp, path) = setup_temp_table();
    fs::write(&path, b"nhf").unwrap();

    let err = HashIndex::open(&path, false, 512).err().unwrap();

    assert!(matches!(err, StoreError::TooShort { .. }));
}

#[test]
fn test_oversized_header_geometry_is_rejected() {
    let (_temp, path) = setup_temp_table();
    let mut header = b"nhf\x01".to_vec();
    header.extend_from_slice(&i32::MAX.to_be_bytes());
    header.extend_from_slice(&i32::MAX.to_be_bytes());
    header.extend_from_slice(&0i32.to_be_bytes());
    fs::write(&path, header).unwrap();

    let err = HashIndex::open(&path, false, 512).err().unwrap();

    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[test]
fn test_header_bucket_count_larger_than_file_is_rejected() {
    let (_temp, path) = setup_temp_table();
    let mut header = b"nhf\x01".to_vec();
    header.extend_from_slice(&i32::MAX.to_be_bytes());
    header.extend_from_slice(&8i32.to_be_bytes());
    header.extend_from_slice(&0i32.to_be_bytes());
    fs::write(&path, header).unwrap();

    let err = HashIndex::open(&path, false, 512).err().unwrap();

    assert!(matches!(err, StoreError::Corrupt(_)));
}
