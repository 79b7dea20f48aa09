//! Codec Module
//!
//! Pure, stateless transforms over byte buffers.
//!
//! ## Responsibilities
//! - CRC16 checksums for stored-byte integrity
//! - SHA-256 content hashing for dedup and caller verification
//! - Zstd compression/decompression for large payloads
//! - Fixed-width integer encoding for offsets and sizes
//!
//! No component above assumes anything about these encodings beyond
//! "round-trips exactly and is stable within one process run".

mod compress;
mod crc16;
mod hash;

pub use compress::{compress, decompress};
pub use crc16::{crc16, crc16_bytes, CHECKSUM_LEN};
pub use hash::{content_hash, content_hash_reader, ContentHash, CONTENT_HASH_LEN};

/// Width of an encoded offset or size
pub const FIXED_INT_LEN: usize = 4;

/// Encode a u32 as 4 little-endian bytes
pub fn encode_u32(value: u32) -> [u8; FIXED_INT_LEN] {
    value.to_le_bytes()
}

/// Decode 4 little-endian bytes back into a u32
pub fn decode_u32(bytes: [u8; FIXED_INT_LEN]) -> u32 {
    u32::from_le_bytes(bytes)
}
