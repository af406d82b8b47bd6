//! stratacache - Embedded Two-Tier Caching Engine
//!
//! An in-process memory cache and a persistent disk cache unified behind a
//! single manager with transparent fallback, promotion, and invalidation.
//!
//! # Features
//!
//! - Byte-budgeted tiers with LRU/LFU/FIFO eviction
//! - TTL expiry, lazy on access plus background sweeping
//! - LZ4 compression for disk payloads above a size threshold
//! - Atomic disk writes (no reader ever sees a partial blob)
//! - Versioned keys: bumping `cache_version` invalidates everything
//!   logically without touching storage
//! - Single-wildcard pattern invalidation across both tiers
//! - Function-result memoization with explicit key builders
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use stratacache::{CacheConfig, CacheManager};
//!
//! let manager = CacheManager::new(CacheConfig::development()).unwrap();
//!
//! manager.set("analysis:post:1", Bytes::from_static(b"result"));
//! assert_eq!(manager.get("analysis:post:1").unwrap().as_ref(), b"result");
//!
//! manager.invalidate_pattern("analysis:*");
//! assert!(manager.get("analysis:post:1").is_none());
//! ```
//!
//! # Modules
//!
//! - [`cache`] - The caching engine (config, tiers, manager)
//! - [`error`] - Error types
//! - [`memoize`] - Function-result memoization built atop the manager

pub mod cache;
pub mod error;
pub mod memoize;

// Re-export commonly used types
pub use cache::config::{CacheConfig, EvictionPolicy};
pub use cache::disk::DiskCache;
pub use cache::manager::{CacheManager, CacheStats, ClearScope, SetOptions};
pub use cache::memory::MemoryCache;
pub use error::{Error, Result};

use once_cell::sync::OnceCell;
use std::sync::Arc;

// =============================================================================
// Process-wide default manager (opt-in)
// =============================================================================

static DEFAULT_MANAGER: OnceCell<Arc<CacheManager>> = OnceCell::new();

/// Install the process-wide default manager
///
/// Intended for the application's composition root only; library code
/// should take a manager as an explicit dependency. Fails if a default was
/// already installed.
pub fn init_default_manager(config: CacheConfig) -> Result<Arc<CacheManager>> {
    let manager = Arc::new(CacheManager::new(config)?);
    DEFAULT_MANAGER
        .set(Arc::clone(&manager))
        .map_err(|_| Error::Config("default cache manager already initialized".into()))?;
    Ok(manager)
}

/// The process-wide default manager, if one was installed
pub fn default_manager() -> Option<Arc<CacheManager>> {
    DEFAULT_MANAGER.get().cloned()
}

// =============================================================================
// Tests
// =============================================================================
