//! Configuration for the value store
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Main configuration for a value store instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the three store files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {prefix}.dat     (blob log)
    ///     ├── {prefix}.id      (offset index)
    ///     └── {prefix}.hash    (hash index)
    pub data_dir: PathBuf,

    /// File name prefix shared by the three files
    pub file_prefix: String,

    /// fsync every file on `sync()`
    pub force_sync: bool,

    // -------------------------------------------------------------------------
    // Hash Index Configuration
    // -------------------------------------------------------------------------
    /// Initial capacity of a freshly created hash index, in items.
    /// The table starts with ceil(size / 8) buckets of 8 slots.
    pub hash_initial_size: u32,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Number of ID → value entries kept in memory (0 disables the cache)
    pub value_cache_size: usize,

    /// Number of value → ID entries kept in memory (0 disables the cache)
    pub id_cache_size: usize,

    // -------------------------------------------------------------------------
    // Recovery Configuration
    // -------------------------------------------------------------------------
    /// Reconstruct records whose length prefix is unreadable from the
    /// neighbouring offsets instead of failing the read
    pub recover_corrupt_data: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./valuestore_data"),
            file_prefix: "values".to_string(),
            force_sync: false,
            hash_initial_size: 512,
            value_cache_size: 512,
            id_cache_size: 128,
            recover_corrupt_data: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the settings that cannot be fixed up silently
    pub fn validate(&self) -> Result<()> {
        if self.file_prefix.is_empty() {
            return Err(StoreError::Config("file prefix must not be empty".to_string()));
        }
        if self.file_prefix.contains(&['/', '\\'][..]) {
            return Err(StoreError::Config(format!(
                "file prefix must not contain path separators: {}",
                self.file_prefix
            )));
        }
        if self.hash_initial_size == 0 {
            return Err(StoreError::Config(
                "hash initial size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the blob log file
    pub fn data_path(&self) -> PathBuf {
        self.file_path("dat")
    }

    /// Path of the offset index file
    pub fn id_path(&self) -> PathBuf {
        self.file_path("id")
    }

    /// Path of the hash index file
    pub fn hash_path(&self) -> PathBuf {
        self.file_path("hash")
    }

    fn file_path(&self, extension: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}", self.file_prefix, extension))
    }

    /// The data directory
    pub fn dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the file name prefix
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    /// Force an fsync on every `sync()`
    pub fn force_sync(mut self, force: bool) -> Self {
        self.config.force_sync = force;
        self
    }

    /// Set the initial hash index capacity (in items)
    pub fn hash_initial_size(mut self, size: u32) -> Self {
        self.config.hash_initial_size = size;
        self
    }

    /// Set the ID → value cache capacity
    pub fn value_cache_size(mut self, entries: usize) -> Self {
        self.config.value_cache_size = entries;
        self
    }

    /// Set the value → ID cache capacity
    pub fn id_cache_size(mut self, entries: usize) -> Self {
        self.config.id_cache_size = entries;
        self
    }

    /// Enable best-effort recovery of records with an unreadable length
    pub fn recover_corrupt_data(mut self, recover: bool) -> Self {
        self.config.recover_corrupt_data = recover;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
