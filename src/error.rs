//! Error types for the caching engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the caching engine
///
/// Steady-state `get`/`set` calls on the tiers never surface `Io` or index
/// variants; they degrade to a miss or a `false` return and log. Errors
/// escape as values only from constructors, the typed value layer, and
/// explicit maintenance calls.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value detected at construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata index error
    #[error("Metadata index error: {0}")]
    Index(#[from] rusqlite::Error),

    /// Value could not be encoded for caching (a caller bug, not an
    /// environmental condition)
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Cached bytes could not be decoded into the requested type
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },
}
