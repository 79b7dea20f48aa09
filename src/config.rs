//! Configuration for binstore
//!
//! Centralized configuration with sensible defaults. The engine never
//! hardcodes a limit; everything tunable is resolved here.

use std::path::PathBuf;

/// Main configuration for a binstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the backing file
    /// Internal structure:
    ///   {data_dir}/
    ///     └── storage.bin      (single append-only backing file)
    pub data_dir: PathBuf,

    /// Maximum serialized size of the in-memory index (in bytes)
    pub max_index_size: u64,

    /// Maximum size of the backing file (in bytes, 0 = unlimited)
    pub max_storage_file_size: u64,

    // -------------------------------------------------------------------------
    // Compression Configuration
    // -------------------------------------------------------------------------
    /// Payloads larger than this (in bytes) are compressed before storing
    pub compression_threshold: u64,

    // -------------------------------------------------------------------------
    // Memory Configuration
    // -------------------------------------------------------------------------
    /// Process memory usage (in bytes) above which a reclamation pass runs
    /// (0 disables the reclaimer)
    pub memory_flush_threshold: u64,

    /// Process memory usage (in bytes) above which reclamation repeats in a
    /// bounded loop as backpressure
    pub memory_critical_threshold: u64,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Number of completed reads after which an entry's stored bytes are
    /// promoted into its in-memory cache slot (0 disables caching)
    pub cache_fetch_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./binstore_data"),
            max_index_size: 16 * 1024 * 1024,            // 16 MB
            max_storage_file_size: 0,                    // unlimited
            compression_threshold: 16 * 1024,            // 16 KB
            memory_flush_threshold: 512 * 1024 * 1024,   // 512 MB
            memory_critical_threshold: 1024 * 1024 * 1024, // 1 GB
            cache_fetch_threshold: 3,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (where the backing file lives)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the maximum serialized index size (in bytes)
    pub fn max_index_size(mut self, size: u64) -> Self {
        self.config.max_index_size = size;
        self
    }

    /// Set the maximum backing-file size (in bytes, 0 = unlimited)
    pub fn max_storage_file_size(mut self, size: u64) -> Self {
        self.config.max_storage_file_size = size;
        self
    }

    /// Set the compression threshold (in bytes)
    pub fn compression_threshold(mut self, size: u64) -> Self {
        self.config.compression_threshold = size;
        self
    }

    /// Set the memory flush threshold (in bytes, 0 disables the reclaimer)
    pub fn memory_flush_threshold(mut self, size: u64) -> Self {
        self.config.memory_flush_threshold = size;
        self
    }

    /// Set the memory critical threshold (in bytes)
    pub fn memory_critical_threshold(mut self, size: u64) -> Self {
        self.config.memory_critical_threshold = size;
        self
    }

    /// Set the cache promotion fetch-count threshold (0 disables caching)
    pub fn cache_fetch_threshold(mut self, count: u32) -> Self {
        self.config.cache_fetch_threshold = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
