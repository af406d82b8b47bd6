//! Cache Compression Support
//!
//! LZ4 compression for disk-bound payloads, with automatic fallback to
//! uncompressed storage when compression fails or does not shrink the data.
//!
//! # Example
//!
//! ```
//! use stratacache::cache::compression::CompressionEngine;
//!
//! let engine = CompressionEngine::new(true, 64, 4);
//!
//! let data = b"Hello, this is test data that should compress well! \
//!     Hello, this is test data that should compress well!";
//! let outcome = engine.compress(data, false);
//!
//! let restored = engine.decompress(&outcome.data, outcome.compressed).unwrap();
//! assert_eq!(restored.as_ref(), data);
//! ```

use bytes::Bytes;

use crate::error::{Error, Result};

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for compression implementations
pub trait Compressor: Send + Sync {
    /// Get the algorithm name
    fn name(&self) -> &'static str;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

// =============================================================================
// No-Op Compressor
// =============================================================================

/// Pass-through compressor (no compression)
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

// =============================================================================
// LZ4 Compressor
// =============================================================================

/// LZ4 compressor (fast compression)
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    /// Create with a compression level in [1, 9]
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level as i32,
        }
    }
}

impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| Error::CompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|e| Error::DecompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Compression Engine
// =============================================================================

/// Result of a compression attempt
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// Bytes to store
    pub data: Bytes,
    /// Whether `data` is compressed
    pub compressed: bool,
    /// Stored size / original size (1.0 when stored uncompressed)
    pub ratio: f64,
}

/// Policy-applying wrapper around the compressors
///
/// Compression triggers when enabled and the payload is at least the
/// threshold size, or when explicitly forced. Payloads that fail to
/// compress, or that compress to no smaller than the input, are stored
/// uncompressed.
pub struct CompressionEngine {
    enabled: bool,
    threshold: u64,
    lz4: Lz4Compressor,
}

impl CompressionEngine {
    /// Create an engine with the given policy parameters
    pub fn new(enabled: bool, threshold: u64, level: u32) -> Self {
        Self {
            enabled,
            threshold,
            lz4: Lz4Compressor::with_level(level),
        }
    }

    /// Compress `data` according to policy
    pub fn compress(&self, data: &[u8], force: bool) -> CompressionOutcome {
        let eligible = force || (self.enabled && data.len() as u64 >= self.threshold);
        if !eligible || data.is_empty() {
            return CompressionOutcome {
                data: Bytes::copy_from_slice(data),
                compressed: false,
                ratio: 1.0,
            };
        }

        match self.lz4.compress(data) {
            Ok(compressed) if compressed.len() < data.len() => {
                let ratio = compressed.len() as f64 / data.len() as f64;
                CompressionOutcome {
                    data: Bytes::from(compressed),
                    compressed: true,
                    ratio,
                }
            }
            Ok(_) => CompressionOutcome {
                data: Bytes::copy_from_slice(data),
                compressed: false,
                ratio: 1.0,
            },
            Err(e) => {
                tracing::warn!("Compression failed, storing uncompressed: {}", e);
                CompressionOutcome {
                    data: Bytes::copy_from_slice(data),
                    compressed: false,
                    ratio: 1.0,
                }
            }
        }
    }

    /// Decompress stored bytes
    pub fn decompress(&self, data: &[u8], compressed: bool) -> Result<Bytes> {
        if !compressed {
            return Ok(Bytes::copy_from_slice(data));
        }
        let restored = self.lz4.decompress(data)?;
        Ok(Bytes::from(restored))
    }
}

// =============================================================================
// Tests
// =============================================================================
