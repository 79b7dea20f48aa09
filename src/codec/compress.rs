//! Payload compression
//!
//! Zstd wrappers used by the write and read pipelines. Compression is
//! lossless and must round-trip exactly; nothing above this module depends
//! on the compressed representation itself.

use crate::error::Result;

/// Zstd compression level for stored payloads
const COMPRESSION_LEVEL: i32 = 3;

/// Compress a payload
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::encode_all(bytes, COMPRESSION_LEVEL)?)
}

/// Decompress a stored payload back to its raw bytes
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::decode_all(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_round_trip() {
        let data = b"abcabcabcabcabcabcabcabcabcabc".repeat(100);
        let compressed = compress(&data).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_compress_shrinks_repetitive_data() {
        let data = vec![0u8; 64 * 1024];
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
    }

    #[test]
    fn test_compress_empty_round_trip() {
        let compressed = compress(&[]).unwrap();
        assert!(decompress(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress(b"definitely not a zstd frame").is_err());
    }
}
