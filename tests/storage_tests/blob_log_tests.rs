//! Tests for BlobLog
//!
//! These tests verify:
//! - Header creation and validation on open
//! - Append/read of length-prefixed records
//! - Recovery of records with an unusable length prefix
//! - Forward iteration, including a torn trailing record
//! - Persistence across reopen

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;
use valuestore::storage::{Blob, BlobLog};
use valuestore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("values.dat");
    (temp_dir, path)
}

/// Overwrite the 4-byte length prefix of the record at `offset`
fn corrupt_length(path: &PathBuf, offset: u64, len: i32) {
    let mut bytes = fs::read(path).unwrap();
    let at = offset as usize;
    bytes[at..at + 4].copy_from_slice(&len.to_be_bytes());
    fs::write(path, bytes).unwrap();
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_writes_header() {
    let (_temp, path) = setup_temp_log();

    let log = BlobLog::open(&path, false).unwrap();

    assert_eq!(log.len().unwrap(), 4);
    assert!(log.is_empty().unwrap());
    assert_eq!(fs::read(&path).unwrap(), b"ndf\x01");
}

#[test]
fn test_open_rejects_wrong_magic() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, b"nid\x01\0\0\0\0").unwrap();

    let err = BlobLog::open(&path, false).err().unwrap();

    assert!(matches!(err, StoreError::BadMagic { .. }));
    assert!(err.is_open_error());
}

#[test]
fn test_open_rejects_short_file() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, b"nd").unwrap();

    let err = BlobLog::open(&path, false).err().unwrap();

    assert!(matches!(err, StoreError::TooShort { len: 2, .. }));
}

#[test]
fn test_open_rejects_newer_version() {
    let (_temp, path) = setup_temp_log();
    fs::write(&path, b"ndf\x07").unwrap();

    let err = BlobLog::open(&path, false).err().unwrap();

    assert!(matches!(err, StoreError::FutureFormat { version: 7, .. }));
}

// =============================================================================
// Append/Read Tests
// =============================================================================

#[test]
fn test_append_returns_record_offsets() {
    let (_temp, path) = setup_temp_log();
    let log = BlobLog::open(&path, false).unwrap();

    assert_eq!(log.append(b"alice").unwrap(), 4);
    assert_eq!(log.append(b"bob").unwrap(), 13);
    assert_eq!(log.append(b"").unwrap(), 20);

    assert_eq!(log.read(4).unwrap(), b"alice");
    assert_eq!(log.read(13).unwrap(), b"bob");
    assert_eq!(log.read(20).unwrap(), b"");
    assert_eq!(log.len().unwrap(), 24);
}

#[test]
fn test_record_layout_is_big_endian() {
    let (_temp, path) = setup_temp_log();
    let log = BlobLog::open(&path, false).unwrap();

    log.append(b"xy").unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"ndf\x01\0\0\0\x02xy");
}

#[test]
fn test_read_outside_file_is_corrupt() {
    let (_temp, path) = setup_temp_log();
    let log = BlobLog::open(&path, false).unwrap();
    log.append(b"alice").unwrap();

    assert!(matches!(log.read(0), Err(StoreError::Corrupt(_))));
    assert!(matches!(log.read(100), Err(StoreError::Corrupt(_))));
}

#[test]
fn test_records_survive_reopen() {
    let (_temp, path) = setup_temp_log();
    {
        let log = BlobLog::open(&path, false).unwrap();
        log.append(b"persisted").unwrap();
        log.sync().unwrap();
        log.close().unwrap();
    }

    let log = BlobLog::open(&path, false).unwrap();

    assert_eq!(log.read(4).unwrap(), b"persisted");
    assert_eq!(log.append(b"next").unwrap(), 17);
}

#[test]
fn test_clear_keeps_header() {
    let (_temp, path) = setup_temp_log();
    let log = BlobLog::open(&path, false).unwrap();
    log.append(b"alice").unwrap();

    log.clear().unwrap();

    assert!(log.is_empty().unwrap());
    assert_eq!(log.append(b"bob").unwrap(), 4);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_oversized_length_is_recovered_up_to_boundary() {
    let (_temp, path) = setup_temp_log();
    let log = BlobLog::open(&path, false).unwrap();
    let first = log.append(b"alice").unwrap();
    let second = log.append(b"bob").unwrap();
    drop(log);
    corrupt_length(&path, first, 1_000_000);

    let log = BlobLog::open(&path, false).unwrap();

    assert!(matches!(log.read(first), Err(StoreError::Corrupt(_))));
    assert_eq!(
        log.read_record(first, Some(second)).unwrap(),
        Blob::Recovered(b"alice".to_vec())
    );
    // Neighbouring records are unaffected
    assert_eq!(log.read_record(second, Some(log.len().unwrap())).unwrap(), Blob::Intact(b"bob".to_vec()));
}

#[test]
fn test_negative_length_is_recovered_up_to_end_of_file() {
    let (_temp, path) = setup_temp_log();
    let log = BlobLog::open(&path, false).unwrap();
    let offset = log.append(b"last value").unwrap();
    drop(log);
    corrupt_length(&path, offset, -3);

    let log = BlobLog::open(&path, false).unwrap();
    let end = log.len().unwrap();

    let blob = log.read_record(offset, Some(end)).unwrap();
    assert!(blob.is_recovered());
    assert_eq!(blob.as_bytes(), b"last value");
    assert_eq!(blob.into_intact(), None);
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iter_yields_every_record_in_order() {
    let (_temp, path) = setup_temp_log();
    let log = BlobLog::open(&path, false).unwrap();
    log.append(b"a").unwrap();
    log.append(b"bb").unwrap();
    log.append(b"ccc").unwrap();

    let records: Vec<_> = log.iter().unwrap().map(|r| r.unwrap()).collect();

    assert_eq!(
        records,
        vec![
            (4, b"a".to_vec()),
            (9, b"bb".to_vec()),
            (15, b"ccc".to_vec()),
        ]
    );
}

#[test]
fn test_iter_stops_at_torn_tail() {
    let (_temp, path) = setup_temp_log();
    {
        let log = BlobLog::open(&path, false).unwrap();
        log.append(b"whole").unwrap();
    }
    // Length prefix promising 50 bytes, followed by only 3
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&50i32.to_be_bytes()).unwrap();
    file.write_all(b"abc").unwrap();
    drop(file);

    let log = BlobLog::open(&path, false).unwrap();
    let mut iter = log.iter().unwrap();

    assert_eq!(iter.next().unwrap().unwrap(), (4, b"whole".to_vec()));
    assert!(matches!(iter.next(), Some(Err(StoreError::Corrupt(_)))));
    assert!(iter.next().is_none());
}
