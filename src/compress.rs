//! zstd compression for discovery chunk payloads
//!
//! Encoded partition-key batches are compressed before they land in the
//! shared cache. Chunks written by this crate are always compressed, so
//! decompression is strict: a payload without the zstd magic bytes is an
//! error, not passthrough.

use crate::error::CompressionError;

/// Zstd magic bytes (little-endian): 0xFD2FB528
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Default compression level (3 is a good balance of speed/ratio)
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Check if data is zstd-compressed by checking magic bytes.
#[inline]
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZSTD_MAGIC
}

/// Compress a chunk payload.
pub fn compress_bytes(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    compress_bytes_with_level(data, DEFAULT_COMPRESSION_LEVEL)
}

/// Compress with a custom level (1-22).
pub fn compress_bytes_with_level(data: &[u8], level: i32) -> Result<Vec<u8>, CompressionError> {
    zstd::encode_all(data, level).map_err(|e| CompressionError::CompressFailed(e.to_string()))
}

/// Decompress a chunk payload.
///
/// Rejects payloads without the zstd magic header.
pub fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    if !is_compressed(data) {
        return Err(CompressionError::NotCompressed { size: data.len() });
    }
    zstd::decode_all(data).map_err(|e| CompressionError::DecompressFailed(e.to_string()))
}
