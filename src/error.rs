//! Error types for binstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for binstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("supplied length {expected} does not match source length {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("supplied content hash does not match the computed hash")]
    HashMismatch,

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("key already exists: {0}")]
    DuplicateKey(String),

    #[error("identical content already stored under another key")]
    DuplicateData,

    #[error("key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    #[error("index size {size} exceeds the configured ceiling {limit}")]
    IndexSizeExceeded { size: u64, limit: u64 },

    #[error("write of {size} bytes at offset {offset} exceeds the maximum storage file size {limit}")]
    StorageFileSizeExceeded { offset: u64, size: u64, limit: u64 },

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("stored checksum mismatch: data is corrupted")]
    CorruptedData,

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("serialization error: {0}")]
    Serialization(String),
}
