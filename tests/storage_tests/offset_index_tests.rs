//! Tests for OffsetIndex
//!
//! These tests verify:
//! - Dense ID allocation starting at 1
//! - Slot lookups, including IDs past the end
//! - Persistence across reopen and clearing

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use valuestore::storage::{OffsetIndex, UNSET_OFFSET};
use valuestore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_index() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("values.id");
    (temp_dir, path)
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_new_index_is_empty() {
    let (_temp, path) = setup_temp_index();

    let index = OffsetIndex::open(&path, false).unwrap();

    assert_eq!(index.max_id().unwrap(), 0);
    assert_eq!(fs::read(&path).unwrap(), b"nid\x01\0\0\0\0");
}

#[test]
fn test_ids_are_dense_from_one() {
    let (_temp, path) = setup_temp_index();
    let index = OffsetIndex::open(&path, false).unwrap();

    assert_eq!(index.append_offset(4).unwrap(), 1);
    assert_eq!(index.append_offset(13).unwrap(), 2);
    assert_eq!(index.append_offset(20).unwrap(), 3);

    assert_eq!(index.max_id().unwrap(), 3);
    assert_eq!(index.get_offset(1).unwrap(), 4);
    assert_eq!(index.get_offset(2).unwrap(), 13);
    assert_eq!(index.get_offset(3).unwrap(), 20);
}

#[test]
fn test_slots_are_big_endian_i64() {
    let (_temp, path) = setup_temp_index();
    let index = OffsetIndex::open(&path, false).unwrap();

    index.append_offset(0x0102).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 16);
    assert_eq!(&bytes[8..], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_unknown_id_is_unset() {
    let (_temp, path) = setup_temp_index();
    let index = OffsetIndex::open(&path, false).unwrap();
    index.append_offset(4).unwrap();

    assert_eq!(index.get_offset(2).unwrap(), UNSET_OFFSET);
    assert_eq!(index.get_offset(1_000).unwrap(), UNSET_OFFSET);
}

#[test]
fn test_id_zero_is_rejected() {
    let (_temp, path) = setup_temp_index();
    let index = OffsetIndex::open(&path, false).unwrap();

    assert!(matches!(index.get_offset(0), Err(StoreError::InvalidId(0))));
}

#[test]
fn test_set_offset_overwrites_existing_slot() {
    let (_temp, path) = setup_temp_index();
    let index = OffsetIndex::open(&path, false).unwrap();
    index.append_offset(4).unwrap();

    index.set_offset(1, 99).unwrap();

    assert_eq!(index.get_offset(1).unwrap(), 99);
    assert!(matches!(index.set_offset(2, 5), Err(StoreError::InvalidId(2))));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_offsets_survive_reopen() {
    let (_temp, path) = setup_temp_index();
    {
        let index = OffsetIndex::open(&path, false).unwrap();
        index.append_offset(4).unwrap();
        index.append_offset(13).unwrap();
        index.close().unwrap();
    }

    let index = OffsetIndex::open(&path, false).unwrap();

    assert_eq!(index.max_id().unwrap(), 2);
    assert_eq!(index.get_offset(2).unwrap(), 13);
    assert_eq!(index.append_offset(20).unwrap(), 3);
}

#[test]
fn test_torn_slot_is_overwritten() {
    let (_temp, path) = setup_temp_index();
    {
        let index = OffsetIndex::open(&path, false).unwrap();
        index.append_offset(4).unwrap();
    }
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(&[0, 0, 0]);
    fs::write(&path, bytes).unwrap();

    let index = OffsetIndex::open(&path, false).unwrap();

    assert_eq!(index.max_id().unwrap(), 1);
    assert_eq!(index.append_offset(40).unwrap(), 2);
    assert_eq!(index.get_offset(2).unwrap(), 40);
    assert_eq!(fs::metadata(&path).unwrap().len(), 24);
}

#[test]
fn test_clear_resets_ids() {
    let (_temp, path) = setup_temp_index();
    let index = OffsetIndex::open(&path, false).unwrap();
    index.append_offset(4).unwrap();
    index.append_offset(13).unwrap();

    index.clear().unwrap();

    assert_eq!(index.max_id().unwrap(), 0);
    assert_eq!(index.append_offset(4).unwrap(), 1);
}

#[test]
fn test_open_rejects_blob_log_file() {
    let (_temp, path) = setup_temp_index();
    fs::write(&path, b"ndf\x01\0\0\0\0").unwrap();

    let err = OffsetIndex::open(&path, false).err().unwrap();

    assert!(matches!(err, StoreError::BadMagic { .. }));
}
