// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transparent compression for stored image payloads.
//!
//! Uses zstd with magic-bytes detection, so rows written without
//! compression stay readable after it is switched on (and vice versa).
//!
//! # Feature Flag
//!
//! Compression requires the `compression` feature:
//!
//! ```toml
//! [dependencies]
//! plant-cache = { version = "0.1", features = ["compression"] }
//! ```
//!
//! Without it, payloads are always stored as plain UTF-8 and reading a
//! compressed row fails with [`CompressionError::DecompressFailed`].

/// Zstd magic bytes (little-endian): 0xFD2FB528
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Default compression level (3 is a good balance of speed/ratio)
#[cfg(feature = "compression")]
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("compression failed: {0}")]
    CompressFailed(String),

    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Check if data is zstd-compressed by checking magic bytes.
#[inline]
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZSTD_MAGIC
}

/// Encode a payload for storage, compressing when asked and supported.
pub fn encode_payload(payload: &str, compress: bool) -> Result<Vec<u8>, CompressionError> {
    #[cfg(feature = "compression")]
    if compress {
        return zstd::encode_all(payload.as_bytes(), DEFAULT_COMPRESSION_LEVEL)
            .map_err(|e| CompressionError::CompressFailed(e.to_string()));
    }
    #[cfg(not(feature = "compression"))]
    let _ = compress;

    Ok(payload.as_bytes().to_vec())
}

/// Decode a stored payload, decompressing if it carries the zstd header.
pub fn decode_payload(data: &[u8]) -> Result<String, CompressionError> {
    if is_compressed(data) {
        #[cfg(feature = "compression")]
        {
            let raw = zstd::decode_all(data)
                .map_err(|e| CompressionError::DecompressFailed(e.to_string()))?;
            return Ok(String::from_utf8(raw)?);
        }
        #[cfg(not(feature = "compression"))]
        return Err(CompressionError::DecompressFailed(
            "payload is zstd-compressed but the `compression` feature is disabled".to_string(),
        ));
    }
    Ok(String::from_utf8(data.to_vec())?)
}
