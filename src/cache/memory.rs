//! Memory Cache - In-Process Hot Tier
//!
//! Key -> entry store bounded by a byte budget, with policy-driven eviction
//! on overflow, lazy TTL expiry on access, and a periodic background sweep.
//!
//! # Design
//!
//! - One mutex over the whole entry store and its running totals; compound
//!   operations (evict-then-insert) stay consistent under a single lock scope
//! - Hit/miss/eviction counters are atomics outside the lock
//! - Eviction collects candidates and orders them by the configured policy
//!   at evict time

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;

use super::clock::SharedClock;
use super::config::{CacheConfig, EvictionPolicy};
use super::entry::MemoryEntry;
use super::sweeper::{Cycle, SweeperHandle};

/// An entry plus the monotonic stamps that order same-second events
///
/// The clock ticks in whole seconds, so recency and creation order within
/// one second are disambiguated by a per-cache sequence counter.
#[derive(Debug, Clone)]
struct Slot {
    entry: MemoryEntry,
    created_seq: u64,
    last_seq: u64,
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, Slot>,
    size_bytes: u64,
    seq: u64,
}

struct MemoryInner {
    config: Arc<CacheConfig>,
    clock: SharedClock,
    state: Mutex<MemoryState>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// In-process memory tier
pub struct MemoryCache {
    inner: Arc<MemoryInner>,
    // Held for its Drop: signals and joins the sweep thread
    _sweeper: Option<SweeperHandle>,
}

impl MemoryCache {
    /// Create a memory cache; spawns the expiry sweeper unless
    /// `cleanup_interval_secs` is 0
    pub fn new(config: Arc<CacheConfig>, clock: SharedClock) -> Self {
        let inner = Arc::new(MemoryInner {
            config: Arc::clone(&config),
            clock,
            state: Mutex::new(MemoryState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        });

        let sweeper = if config.cleanup_interval_secs > 0 {
            let weak: Weak<MemoryInner> = Arc::downgrade(&inner);
            let interval = Duration::from_secs(config.cleanup_interval_secs);
            Some(SweeperHandle::spawn("memory-sweep", interval, move || {
                match weak.upgrade() {
                    Some(inner) => {
                        let removed = inner.sweep_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "memory sweep removed expired entries");
                        }
                        Cycle::Continue
                    }
                    None => Cycle::Stop,
                }
            }))
        } else {
            None
        };

        Self {
            inner,
            _sweeper: sweeper,
        }
    }

    /// Get a value; expired entries are removed and reported as misses
    pub fn get(&self, key: &str) -> Option<Bytes> {
        enum Lookup {
            Hit(Bytes),
            Expired,
            Miss,
        }

        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        state.seq += 1;
        let seq = state.seq;

        let lookup = match state.entries.get_mut(key) {
            Some(slot) if slot.entry.is_expired(now) => Lookup::Expired,
            Some(slot) => {
                slot.entry.touch(now);
                slot.last_seq = seq;
                Lookup::Hit(slot.entry.value.clone())
            }
            None => Lookup::Miss,
        };

        match lookup {
            Lookup::Hit(value) => {
                drop(state);
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Lookup::Expired => {
                if let Some(slot) = state.entries.remove(key) {
                    state.size_bytes -= slot.entry.size_bytes;
                }
                drop(state);
                self.inner.expirations.fetch_add(1, Ordering::Relaxed);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Miss => {
                drop(state);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace a value
    ///
    /// Rejects keys over the configured length and values that could never
    /// fit the byte budget; otherwise evicts per policy until the new entry
    /// fits.
    pub fn set(&self, key: &str, value: Bytes, ttl: Option<u64>) -> bool {
        if key.len() > self.inner.config.max_key_length {
            tracing::debug!(key_len = key.len(), "memory set rejected: key too long");
            return false;
        }
        let size = value.len() as u64;
        if size > self.inner.config.memory_limit {
            tracing::debug!(size, "memory set rejected: value exceeds tier limit");
            return false;
        }

        let ttl_secs = self.inner.config.resolve_ttl(ttl);
        let now = self.inner.clock.now();

        let mut state = self.inner.state.lock();

        // Replace any existing entry for the key first so its size is not
        // counted against the budget during eviction
        if let Some(old) = state.entries.remove(key) {
            state.size_bytes -= old.entry.size_bytes;
        }

        let evicted = self.evict_until_fits(&mut state, size, now);
        if evicted > 0 {
            self.inner.evictions.fetch_add(evicted, Ordering::Relaxed);
        }

        state.seq += 1;
        let seq = state.seq;
        state.entries.insert(
            key.to_string(),
            Slot {
                entry: MemoryEntry::new(value, ttl_secs, now),
                created_seq: seq,
                last_seq: seq,
            },
        );
        state.size_bytes += size;
        true
    }

    /// Remove an entry; true if it was present
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.inner.state.lock();
        if let Some(slot) = state.entries.remove(key) {
            state.size_bytes -= slot.entry.size_bytes;
            true
        } else {
            false
        }
    }

    /// Check presence without touching access stats
    ///
    /// Expired entries count as absent but are left for the sweep.
    pub fn exists(&self, key: &str) -> bool {
        let now = self.inner.clock.now();
        let state = self.inner.state.lock();
        state
            .entries
            .get(key)
            .map_or(false, |slot| !slot.entry.is_expired(now))
    }

    /// Live keys, after purging expired entries
    pub fn keys(&self) -> Vec<String> {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        let purged = Self::purge_expired(&mut state, now);
        if purged > 0 {
            self.inner.expirations.fetch_add(purged, Ordering::Relaxed);
        }
        state.entries.keys().cloned().collect()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.entries.clear();
        state.size_bytes = 0;
    }

    /// Number of entries (including not-yet-swept expired ones)
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked total of entry sizes in bytes
    pub fn size_bytes(&self) -> u64 {
        self.inner.state.lock().size_bytes
    }

    /// Remove every expired entry; returns how many were removed
    pub fn sweep_expired(&self) -> u64 {
        self.inner.sweep_expired()
    }

    /// Get cache statistics
    pub fn stats(&self) -> MemoryCacheStats {
        let (entries, size_bytes) = {
            let state = self.inner.state.lock();
            (state.entries.len() as u64, state.size_bytes)
        };
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        MemoryCacheStats {
            entries,
            size_bytes,
            limit_bytes: self.inner.config.memory_limit,
            hits,
            misses,
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            expirations: self.inner.expirations.load(Ordering::Relaxed),
        }
    }

    /// Evict entries until `needed` more bytes fit the budget
    ///
    /// Expired entries go first regardless of policy, then candidates in
    /// policy order. Returns the number of evictions.
    fn evict_until_fits(&self, state: &mut MemoryState, needed: u64, now: u64) -> u64 {
        let limit = self.inner.config.memory_limit;
        if state.size_bytes + needed <= limit {
            return 0;
        }

        let purged = Self::purge_expired(state, now);
        if purged > 0 {
            self.inner.expirations.fetch_add(purged, Ordering::Relaxed);
        }
        if state.size_bytes + needed <= limit {
            return 0;
        }

        let policy = self.inner.config.eviction_policy;
        let mut candidates: Vec<(String, u64, u64, u64, u64, u64)> = state
            .entries
            .iter()
            .map(|(key, slot)| {
                (
                    key.clone(),
                    slot.entry.created_at,
                    slot.created_seq,
                    slot.entry.last_accessed,
                    slot.last_seq,
                    slot.entry.access_count,
                )
            })
            .collect();

        match policy {
            EvictionPolicy::Lru => {
                candidates.sort_by_key(|c| (c.3, c.4));
            }
            EvictionPolicy::Lfu => {
                candidates.sort_by_key(|c| (c.5, c.3, c.4));
            }
            EvictionPolicy::Fifo => {
                candidates.sort_by_key(|c| (c.1, c.2));
            }
        }

        let mut evicted = 0;
        for (key, ..) in candidates {
            if state.size_bytes + needed <= limit {
                break;
            }
            if let Some(slot) = state.entries.remove(&key) {
                state.size_bytes -= slot.entry.size_bytes;
                evicted += 1;
            }
        }
        evicted
    }

    fn purge_expired(state: &mut MemoryState, now: u64) -> u64 {
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(slot) = state.entries.remove(key) {
                state.size_bytes -= slot.entry.size_bytes;
            }
        }
        expired.len() as u64
    }
}

impl MemoryInner {
    fn sweep_expired(&self) -> u64 {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let removed = MemoryCache::purge_expired(&mut state, now);
        drop(state);
        if removed > 0 {
            self.expirations.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }
}

/// Memory tier statistics
#[derive(Debug, Clone, Serialize)]
pub struct MemoryCacheStats {
    /// Number of entries
    pub entries: u64,
    /// Tracked total of entry sizes
    pub size_bytes: u64,
    /// Configured byte budget
    pub limit_bytes: u64,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    /// Entries evicted to satisfy the budget
    pub evictions: u64,
    /// Entries removed because their TTL lapsed
    pub expirations: u64,
}

// =============================================================================
// Tests
// =============================================================================
