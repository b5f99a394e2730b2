//! Error types for the value store
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::FileKind;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for value store operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Open Errors (fatal, never auto-repaired)
    // -------------------------------------------------------------------------
    #[error("File too short to be a compatible {kind} file: {path} ({len} bytes)")]
    TooShort {
        kind: FileKind,
        path: PathBuf,
        len: u64,
    },

    #[error("File doesn't contain compatible {kind} data: {path}")]
    BadMagic { kind: FileKind, path: PathBuf },

    #[error("Unable to read {kind} file {path}; it uses a newer file format (version {version})")]
    FutureFormat {
        kind: FileKind,
        path: PathBuf,
        version: u8,
    },

    #[error("Unable to read {kind} file {path}; invalid file format version: {version}")]
    InvalidFormatVersion {
        kind: FileKind,
        path: PathBuf,
        version: u8,
    },

    // -------------------------------------------------------------------------
    // Data Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    // -------------------------------------------------------------------------
    // Precondition Violations
    // -------------------------------------------------------------------------
    #[error("Invalid value ID: {0} (IDs start at 1)")]
    InvalidId(u32),

    #[error("Value too large: {0} bytes")]
    ValueTooLarge(usize),

    #[error("Value store is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// True for the errors raised while validating a file header on open.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            StoreError::TooShort { .. }
                | StoreError::BadMagic { .. }
                | StoreError::FutureFormat { .. }
                | StoreError::InvalidFormatVersion { .. }
        )
    }
}
