//! Content hashing
//!
//! SHA-256 digests of the raw (pre-compression) payload. The digest is used
//! both for content deduplication and for verifying a caller-supplied
//! expected hash.

use std::io::Read;

use sha2::{Digest, Sha256};

use crate::error::Result;

/// Width of a content hash
pub const CONTENT_HASH_LEN: usize = 32;

/// A content hash over the raw payload bytes
pub type ContentHash = [u8; CONTENT_HASH_LEN];

/// Read buffer size for streaming hashes
const HASH_BUFFER_SIZE: usize = 8 * 1024;

/// Compute the content hash of an in-memory buffer
pub fn content_hash(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Compute the content hash of a reader without loading it whole
///
/// Reads in fixed-size chunks so arbitrarily large sources hash in
/// constant memory.
pub fn content_hash_reader<R: Read>(reader: &mut R) -> Result<ContentHash> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize().into())
}
