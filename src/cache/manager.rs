//! Cache Manager - Unified Two-Tier Cache
//!
//! Orchestrates the memory and disk tiers: read-through with promotion on a
//! disk hit, configurable write fanout, global key versioning, pattern
//! invalidation, statistics aggregation, and optional background warming.
//!
//! Every caller-supplied logical key is rewritten into a versioned physical
//! key before either tier sees it; the tiers never observe unversioned keys.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::clock::{system_clock, SharedClock};
use super::config::CacheConfig;
use super::disk::{DiskCache, DiskCacheStats};
use super::key;
use super::memory::{MemoryCache, MemoryCacheStats};
use super::pattern;
use super::sweeper::{Cycle, SweeperHandle};
use crate::error::{Error, Result};

/// Capacity of the warming queue; pushes beyond it are dropped so the
/// foreground write path never blocks on warming
const WARM_QUEUE_CAPACITY: usize = 256;

/// Fallback warming period when background sweeping is disabled
const WARM_INTERVAL_SECS: u64 = 60;

/// Per-write options for [`CacheManager::set_with`]
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// TTL override in seconds (`None` uses the configured default)
    pub ttl_secs: Option<u64>,
    /// Write only to the memory tier
    pub memory_only: bool,
    /// Write only to the disk tier
    pub disk_only: bool,
    /// Compress regardless of size threshold (disk tier only)
    pub force_compression: bool,
}

/// Which tiers [`CacheManager::clear`] drops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// Clear both tiers
    All,
    /// Clear only the memory tier
    MemoryOnly,
    /// Clear only the disk tier
    DiskOnly,
}

struct ManagerInner {
    config: Arc<CacheConfig>,
    memory: Option<MemoryCache>,
    disk: Option<DiskCache>,
    warm_queue: ArrayQueue<String>,
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
}

/// Unified two-tier cache
pub struct CacheManager {
    inner: Arc<ManagerInner>,
    // Held for its Drop: signals and joins the warming thread
    _warmer: Option<SweeperHandle>,
}

impl CacheManager {
    /// Create a manager with the system clock
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Create a manager with an injected clock (used by TTL tests)
    pub fn with_clock(config: CacheConfig, clock: SharedClock) -> Result<Self> {
        let config = Arc::new(config.validated()?);

        let memory = if config.memory_cache_enabled {
            Some(MemoryCache::new(Arc::clone(&config), Arc::clone(&clock)))
        } else {
            None
        };
        let disk = if config.disk_cache_enabled {
            Some(DiskCache::open(Arc::clone(&config), Arc::clone(&clock))?)
        } else {
            None
        };

        let inner = Arc::new(ManagerInner {
            config: Arc::clone(&config),
            memory,
            disk,
            warm_queue: ArrayQueue::new(WARM_QUEUE_CAPACITY),
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
        });

        let warmer = if config.warming_enabled
            && config.memory_cache_enabled
            && config.disk_cache_enabled
        {
            let weak: Weak<ManagerInner> = Arc::downgrade(&inner);
            let interval = if config.cleanup_interval_secs > 0 {
                config.cleanup_interval_secs
            } else {
                WARM_INTERVAL_SECS
            };
            Some(SweeperHandle::spawn(
                "warming",
                Duration::from_secs(interval),
                move || match weak.upgrade() {
                    Some(inner) => {
                        let promoted = inner.process_warming_queue();
                        if promoted > 0 {
                            tracing::debug!(promoted, "warming promoted disk entries into memory");
                        }
                        Cycle::Continue
                    }
                    None => Cycle::Stop,
                },
            ))
        } else {
            None
        };

        Ok(Self {
            inner,
            _warmer: warmer,
        })
    }

    /// Get a value, trying memory first, then disk
    ///
    /// A disk hit is promoted into the memory tier; promotion failure is
    /// silent and never fails the read.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        let pk = self.physical(key);

        if let Some(memory) = &self.inner.memory {
            if let Some(value) = memory.get(&pk) {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                self.inner.memory_hits.fetch_add(1, Ordering::Relaxed);
                return Some(value);
            }
        }

        if let Some(disk) = &self.inner.disk {
            if let Some(value) = disk.get(&pk) {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                self.inner.disk_hits.fetch_add(1, Ordering::Relaxed);

                if let Some(memory) = &self.inner.memory {
                    if !memory.set(&pk, value.clone(), None) {
                        tracing::debug!(key, "promotion into memory rejected");
                    }
                }
                return Some(value);
            }
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Get a value, or `default` on a miss
    pub fn get_or(&self, key: &str, default: Bytes) -> Bytes {
        self.get(key).unwrap_or(default)
    }

    /// Write a value to every enabled tier with default options
    pub fn set(&self, key: &str, value: Bytes) -> bool {
        self.set_with(key, value, SetOptions::default())
    }

    /// Write a value according to `options`
    ///
    /// Returns true if at least one tier accepted the write. Setting both
    /// `memory_only` and `disk_only` is a caller error; the flags cancel
    /// out and the write goes to both tiers (logged, never corrupts state).
    pub fn set_with(&self, key: &str, value: Bytes, options: SetOptions) -> bool {
        let (memory_only, disk_only) = if options.memory_only && options.disk_only {
            tracing::warn!(key, "memory_only and disk_only both set; writing to both tiers");
            (false, false)
        } else {
            (options.memory_only, options.disk_only)
        };

        let pk = self.physical(key);
        let mut memory_ok = false;
        let mut disk_ok = false;

        if !disk_only {
            if let Some(memory) = &self.inner.memory {
                memory_ok = memory.set(&pk, value.clone(), options.ttl_secs);
            }
        }
        if !memory_only {
            if let Some(disk) = &self.inner.disk {
                disk_ok = disk.set(&pk, &value, options.ttl_secs, options.force_compression);
            }
        }

        // Disk-resident but not memory-resident: candidate for warming.
        // A full queue drops the key rather than blocking the caller.
        if disk_ok && !memory_ok && self.inner.memory.is_some() {
            let _ = self.inner.warm_queue.push(key.to_string());
        }

        memory_ok || disk_ok
    }

    /// Serialize a typed value and write it to every enabled tier
    ///
    /// Encoding failure indicates an uncacheable value (a caller bug) and
    /// propagates, unlike environmental I/O degradation.
    pub fn set_value<T: Serialize>(&self, key: &str, value: &T, options: SetOptions) -> Result<bool> {
        let encoded =
            bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(self.set_with(key, Bytes::from(encoded), options))
    }

    /// Get a typed value decoded from the cached bytes
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)
                    .map_err(|e| Error::Deserialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Delete from every enabled tier; true if any tier had the key
    pub fn delete(&self, key: &str) -> bool {
        let pk = self.physical(key);
        let memory_had = self
            .inner
            .memory
            .as_ref()
            .map_or(false, |memory| memory.delete(&pk));
        let disk_had = self
            .inner
            .disk
            .as_ref()
            .map_or(false, |disk| disk.delete(&pk));
        memory_had || disk_had
    }

    /// Check presence without mutating access stats (memory before disk)
    pub fn exists(&self, key: &str) -> bool {
        let pk = self.physical(key);
        if let Some(memory) = &self.inner.memory {
            if memory.exists(&pk) {
                return true;
            }
        }
        self.inner
            .disk
            .as_ref()
            .map_or(false, |disk| disk.exists(&pk))
    }

    /// Clear the selected tier(s); always drains the warming queue
    pub fn clear(&self, scope: ClearScope) {
        while self.inner.warm_queue.pop().is_some() {}

        if scope != ClearScope::DiskOnly {
            if let Some(memory) = &self.inner.memory {
                memory.clear();
            }
        }
        if scope != ClearScope::MemoryOnly {
            if let Some(disk) = &self.inner.disk {
                if let Err(e) = disk.clear() {
                    tracing::warn!("disk clear failed: {}", e);
                }
            }
        }
    }

    /// Union of both tiers' live logical keys
    ///
    /// Keys that were collapsed to a hash (longer than `max_key_length`)
    /// cannot be mapped back and are omitted.
    pub fn keys(&self, include_memory: bool, include_disk: bool) -> Vec<String> {
        let version = &self.inner.config.cache_version;
        let mut union = std::collections::BTreeSet::new();

        if include_memory {
            if let Some(memory) = &self.inner.memory {
                for pk in memory.keys() {
                    if let Some(logical) = key::logical_key(&pk, version) {
                        union.insert(logical.to_string());
                    }
                }
            }
        }
        if include_disk {
            if let Some(disk) = &self.inner.disk {
                for pk in disk.keys() {
                    if let Some(logical) = key::logical_key(&pk, version) {
                        union.insert(logical.to_string());
                    }
                }
            }
        }

        union.into_iter().collect()
    }

    /// Delete every key matching a single-wildcard pattern
    ///
    /// Returns the number of distinct keys deleted across the union of
    /// both tiers.
    pub fn invalidate_pattern(&self, pattern_str: &str) -> usize {
        let mut deleted = 0;
        for logical in self.keys(true, true) {
            if pattern::matches(&logical, pattern_str) && self.delete(&logical) {
                deleted += 1;
            }
        }
        if deleted > 0 {
            tracing::debug!(pattern = pattern_str, deleted, "pattern invalidation");
        }
        deleted
    }

    /// Promote queued disk-resident keys into memory; returns how many
    /// entries were promoted
    ///
    /// Runs on the warming thread, but is callable directly for
    /// deterministic tests and manual warming.
    pub fn process_warming_queue(&self) -> u64 {
        self.inner.process_warming_queue()
    }

    /// Number of keys currently queued for warming
    pub fn warm_pending(&self) -> usize {
        self.inner.warm_queue.len()
    }

    /// Aggregate statistics: global counters, derived rates, per-tier
    /// stats, and the active configuration
    pub fn stats(&self) -> CacheStats {
        let requests = self.inner.requests.load(Ordering::Relaxed);
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let memory_hits = self.inner.memory_hits.load(Ordering::Relaxed);
        let disk_hits = self.inner.disk_hits.load(Ordering::Relaxed);

        let rate = |count: u64| {
            if requests == 0 {
                0.0
            } else {
                count as f64 / requests as f64
            }
        };

        CacheStats {
            requests,
            hits,
            misses,
            hit_rate: rate(hits),
            memory_hits,
            memory_hit_rate: rate(memory_hits),
            disk_hits,
            disk_hit_rate: rate(disk_hits),
            memory: self.inner.memory.as_ref().map(|m| m.stats()),
            disk: self.inner.disk.as_ref().map(|d| d.stats()),
            config: (*self.inner.config).clone(),
        }
    }

    /// Direct access to the memory tier (None when disabled)
    pub fn memory(&self) -> Option<&MemoryCache> {
        self.inner.memory.as_ref()
    }

    /// Direct access to the disk tier (None when disabled)
    pub fn disk(&self) -> Option<&DiskCache> {
        self.inner.disk.as_ref()
    }

    /// Active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Translate a logical key into its versioned physical key
    pub fn physical(&self, logical: &str) -> String {
        key::physical_key(
            logical,
            &self.inner.config.cache_version,
            self.inner.config.max_key_length,
        )
    }
}

impl ManagerInner {
    fn process_warming_queue(&self) -> u64 {
        let (memory, disk) = match (&self.memory, &self.disk) {
            (Some(memory), Some(disk)) => (memory, disk),
            _ => return 0,
        };

        let mut promoted = 0;
        while let Some(logical) = self.warm_queue.pop() {
            let pk = key::physical_key(
                &logical,
                &self.config.cache_version,
                self.config.max_key_length,
            );
            if memory.exists(&pk) {
                continue;
            }
            if let Some(value) = disk.get(&pk) {
                if memory.set(&pk, value, None) {
                    promoted += 1;
                }
            }
        }
        promoted
    }
}

/// Aggregate manager statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Total `get` calls
    pub requests: u64,
    /// Requests served from either tier
    pub hits: u64,
    /// Requests served from neither tier
    pub misses: u64,
    /// hits / requests (0.0 when no requests)
    pub hit_rate: f64,
    /// Requests served from memory
    pub memory_hits: u64,
    /// memory_hits / requests
    pub memory_hit_rate: f64,
    /// Requests served from disk
    pub disk_hits: u64,
    /// disk_hits / requests
    pub disk_hit_rate: f64,
    /// Memory tier stats (None when the tier is disabled)
    pub memory: Option<MemoryCacheStats>,
    /// Disk tier stats (None when the tier is disabled)
    pub disk: Option<DiskCacheStats>,
    /// Active configuration snapshot
    pub config: CacheConfig,
}

// =============================================================================
// Tests
// =============================================================================
