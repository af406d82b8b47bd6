//! Disk Cache - Persistent Warm Tier
//!
//! Key -> blob store backed by the SQLite metadata index plus a `data/`
//! directory of content files. Writes are atomic (temp file + rename), reads
//! self-heal against corruption, and a background sweep removes expired
//! entries.
//!
//! # Design
//!
//! - The index row is the source of truth; a content file with no row is
//!   garbage and is never served
//! - Content files land via temp-write + `rename`, so no reader ever
//!   observes a partially-written blob
//! - Write ordering keeps the pairing invariant: file before row on insert,
//!   row before file on removal
//! - Steady-state I/O failures degrade to miss/`false`; they never escape

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;

use super::clock::SharedClock;
use super::compression::CompressionEngine;
use super::config::CacheConfig;
use super::index::{DiskIndex, IndexRow};
use super::key;
use super::sweeper::{Cycle, SweeperHandle};
use crate::error::Result;

/// Name of the metadata index file inside the cache directory
const INDEX_FILE: &str = "index.db";

/// Subdirectory holding content blobs
const DATA_DIR: &str = "data";

struct DiskInner {
    config: Arc<CacheConfig>,
    clock: SharedClock,
    compression: CompressionEngine,
    index: DiskIndex,
    data_dir: PathBuf,
    /// Serializes compound read-modify-write sequences (set/delete/clear);
    /// plain reads go straight to the index's own lock
    op_lock: Mutex<()>,
    /// Monotonic stamp ordering accesses within one clock second
    seq: AtomicU64,
    current_size: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Persistent disk tier
pub struct DiskCache {
    inner: Arc<DiskInner>,
    // Held for its Drop: signals and joins the sweep thread
    _sweeper: Option<SweeperHandle>,
}

impl DiskCache {
    /// Open the cache directory, recovering from any interrupted writes
    ///
    /// Creates the directory layout if needed, removes stale temp files,
    /// prunes index rows whose content file vanished, and initializes the
    /// running size total from the index.
    pub fn open(config: Arc<CacheConfig>, clock: SharedClock) -> Result<Self> {
        let data_dir = config.disk_cache_dir.join(DATA_DIR);
        fs::create_dir_all(&data_dir)?;

        let index = DiskIndex::open(config.disk_cache_dir.join(INDEX_FILE))?;

        let inner = Arc::new(DiskInner {
            config: Arc::clone(&config),
            clock,
            compression: CompressionEngine::new(
                config.compression_enabled,
                config.compression_threshold,
                config.compression_level,
            ),
            index,
            data_dir,
            op_lock: Mutex::new(()),
            seq: AtomicU64::new(0),
            current_size: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        });

        inner.recover()?;
        inner
            .current_size
            .store(inner.index.total_size()?, Ordering::Relaxed);
        inner
            .seq
            .store(inner.index.max_touch_seq()?, Ordering::Relaxed);

        let sweeper = if config.cleanup_interval_secs > 0 {
            let weak: Weak<DiskInner> = Arc::downgrade(&inner);
            let interval = Duration::from_secs(config.cleanup_interval_secs);
            Some(SweeperHandle::spawn("disk-sweep", interval, move || {
                match weak.upgrade() {
                    Some(inner) => {
                        let removed = inner.sweep_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "disk sweep removed expired entries");
                        }
                        Cycle::Continue
                    }
                    None => Cycle::Stop,
                }
            }))
        } else {
            None
        };

        Ok(Self {
            inner,
            _sweeper: sweeper,
        })
    }

    /// Get a value; I/O failures and corruption degrade to a miss and
    /// evict the offending entry
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = self.inner.clock.now();

        let row = match self.inner.index.get(key) {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                tracing::warn!(key, "index lookup failed, treating as miss: {}", e);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if row.ttl_secs != 0 && now.saturating_sub(row.created_at) > row.ttl_secs {
            self.inner.remove_entry(&row.key);
            self.inner.expirations.fetch_add(1, Ordering::Relaxed);
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let path = self.inner.data_dir.join(&row.filename);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, path = %path.display(), "unreadable content file, evicting: {}", e);
                self.inner.remove_entry(&row.key);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let value = match self.inner.compression.decompress(&raw, row.compressed) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, "corrupt content file, evicting: {}", e);
                self.inner.remove_entry(&row.key);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        if let Err(e) = self.inner.index.touch(&row.key, now, seq) {
            tracing::warn!(key, "failed to record access: {}", e);
        }
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Write a value; returns false when the entry cannot be stored
    ///
    /// The write is atomic: a temp file in the data directory is renamed
    /// onto the final path, and the index row lands only after the rename.
    /// Failures leave no partial index row and no temp file behind.
    pub fn set(&self, key: &str, value: &[u8], ttl: Option<u64>, force_compression: bool) -> bool {
        if key.len() > self.inner.config.max_key_length {
            tracing::debug!(key_len = key.len(), "disk set rejected: key too long");
            return false;
        }

        let _guard = self.inner.op_lock.lock();

        let outcome = self.inner.compression.compress(value, force_compression);
        let stored_size = outcome.data.len() as u64;
        if stored_size > self.inner.config.disk_limit {
            tracing::debug!(stored_size, "disk set rejected: value exceeds tier limit");
            return false;
        }

        let now = self.inner.clock.now();

        // Budget the write against the tier limit, not counting any entry
        // this key is about to replace
        let old_size = match self.inner.index.get(key) {
            Ok(row) => row.map(|r| r.size_bytes).unwrap_or(0),
            Err(e) => {
                tracing::warn!(key, "index lookup failed, set aborted: {}", e);
                return false;
            }
        };

        let evicted = self
            .inner
            .evict_until_fits(stored_size.saturating_sub(old_size));
        if evicted > 0 {
            self.inner.evictions.fetch_add(evicted, Ordering::Relaxed);
        }

        let filename = key::content_filename(key);
        let final_path = self.inner.data_dir.join(&filename);
        let tmp_path = self.inner.data_dir.join(format!("{}.tmp", filename));

        if let Err(e) = write_atomic(&tmp_path, &final_path, &outcome.data) {
            tracing::warn!(key, "disk write failed: {}", e);
            let _ = fs::remove_file(&tmp_path);
            return false;
        }

        // Swap the row in two steps so every size subtraction pairs with an
        // actual removal and every addition with an actual insert; the
        // running total cannot drift even if the sweeper removes the old
        // row concurrently
        match self.inner.index.remove(key) {
            Ok(Some(old)) => {
                self.inner
                    .current_size
                    .fetch_sub(old.size_bytes, Ordering::Relaxed);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key, "index swap failed, rolling back content file: {}", e);
                let _ = fs::remove_file(&final_path);
                return false;
            }
        }

        let row = IndexRow {
            key: key.to_string(),
            filename,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl_secs: self.inner.config.resolve_ttl(ttl),
            size_bytes: stored_size,
            compressed: outcome.compressed,
            compression_ratio: outcome.ratio,
        };

        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        if let Err(e) = self.inner.index.upsert(&row, seq) {
            tracing::warn!(key, "index write failed, rolling back content file: {}", e);
            let _ = fs::remove_file(&final_path);
            return false;
        }
        self.inner
            .current_size
            .fetch_add(stored_size, Ordering::Relaxed);
        true
    }

    /// Remove an entry; true if it was present
    pub fn delete(&self, key: &str) -> bool {
        let _guard = self.inner.op_lock.lock();
        self.inner.remove_entry(key)
    }

    /// Check presence without mutating access stats
    pub fn exists(&self, key: &str) -> bool {
        let now = self.inner.clock.now();
        match self.inner.index.contains_live(key, now) {
            Ok(live) => live,
            Err(e) => {
                tracing::warn!(key, "index lookup failed, treating as absent: {}", e);
                false
            }
        }
    }

    /// Live keys, after sweeping expired entries
    pub fn keys(&self) -> Vec<String> {
        self.inner.sweep_expired();
        let now = self.inner.clock.now();
        match self.inner.index.live_keys(now) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("index scan failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Drop every entry and its content file
    pub fn clear(&self) -> Result<()> {
        let _guard = self.inner.op_lock.lock();
        self.inner.index.clear()?;
        fs::remove_dir_all(&self.inner.data_dir)?;
        fs::create_dir_all(&self.inner.data_dir)?;
        self.inner.current_size.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Remove every expired entry; returns how many were removed
    pub fn sweep_expired(&self) -> u64 {
        self.inner.sweep_expired()
    }

    /// Number of index rows (including not-yet-swept expired ones)
    pub fn len(&self) -> usize {
        self.inner.index.count().unwrap_or(0) as usize
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked total of stored sizes in bytes
    pub fn size_bytes(&self) -> u64 {
        self.inner.current_size.load(Ordering::Relaxed)
    }

    /// Fetch the metadata row for a key (compression ratio, timestamps)
    pub fn metadata(&self, key: &str) -> Option<IndexRow> {
        self.inner.index.get(key).ok().flatten()
    }

    /// Get cache statistics
    pub fn stats(&self) -> DiskCacheStats {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        DiskCacheStats {
            entries: self.inner.index.count().unwrap_or(0),
            size_bytes: self.inner.current_size.load(Ordering::Relaxed),
            limit_bytes: self.inner.config.disk_limit,
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
}

impl DiskInner {
    /// Startup recovery: drop stale temp files and index rows whose
    /// content file is gone
    fn recover(&self) -> Result<()> {
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("tmp") {
                tracing::debug!(path = %path.display(), "removing interrupted write");
                let _ = fs::remove_file(&path);
            }
        }

        for filename in self.index.filenames()? {
            if !self.data_dir.join(&filename).exists() {
                tracing::warn!(filename = %filename, "pruning index row with missing content file");
                self.index.remove_by_filename(&filename)?;
            }
        }
        Ok(())
    }

    /// Remove a row and its content file; true if the row existed
    fn remove_entry(&self, key: &str) -> bool {
        match self.index.remove(key) {
            Ok(Some(row)) => {
                self.current_size.fetch_sub(row.size_bytes, Ordering::Relaxed);
                let path = self.data_dir.join(&row.filename);
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(key, "failed to remove content file: {}", e);
                    }
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(key, "index removal failed: {}", e);
                false
            }
        }
    }

    /// Evict entries in policy order until `needed` more bytes fit
    fn evict_until_fits(&self, needed: u64) -> u64 {
        let limit = self.config.disk_limit;
        if self.current_size.load(Ordering::Relaxed) + needed <= limit {
            return 0;
        }

        // Expired entries go first regardless of policy
        let swept = self.sweep_expired();
        if swept > 0 && self.current_size.load(Ordering::Relaxed) + needed <= limit {
            return 0;
        }

        let candidates = match self.index.eviction_candidates(self.config.eviction_policy) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("eviction scan failed: {}", e);
                return 0;
            }
        };

        let mut evicted = 0;
        for row in candidates {
            if self.current_size.load(Ordering::Relaxed) + needed <= limit {
                break;
            }
            if self.remove_entry(&row.key) {
                evicted += 1;
            }
        }
        evicted
    }

    fn sweep_expired(&self) -> u64 {
        let now = self.clock.now();
        let expired = match self.index.expired(now) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("expiry scan failed: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for row in expired {
            if self.remove_entry(&row.key) {
                removed += 1;
            }
        }
        if removed > 0 {
            self.expirations.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }
}

/// Write `data` to `tmp_path`, fsync, then atomically rename onto
/// `final_path`
fn write_atomic(tmp_path: &std::path::Path, final_path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
    {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, final_path)
}

/// Disk tier statistics
#[derive(Debug, Clone, Serialize)]
pub struct DiskCacheStats {
    /// Number of index rows
    pub entries: u64,
    /// Tracked total of stored sizes
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::{ManualClock, SharedClock};
    use crate::cache::config::EvictionPolicy;
    use tempfile::TempDir;

    fn open_cache(mut config: CacheConfig) -> (DiskCache, Arc<ManualClock>, TempDir) {
        let temp = TempDir::new().unwrap();
        config.disk_cache_dir = temp.path().to_path_buf();
        config.cleanup_interval_secs = 0;
        let clock = Arc::new(ManualClock::default());
        let cache = DiskCache::open(Arc::new(config), clock.clone() as SharedClock).unwrap();
        (cache, clock, temp)
    }

    fn no_compression() -> CacheConfig {
        CacheConfig {
            compression_enabled: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_set_get_roundtrip() {
        let (cache, _, _temp) = open_cache(no_compression());

        assert!(cache.set("k", b"disk value", None, false));
        assert_eq!(cache.get("k").unwrap().as_ref(), b"disk value");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), 10);
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            disk_cache_dir: temp.path().to_path_buf(),
            cleanup_interval_secs: 0,
            compression_enabled: false,
            ..Default::default()
        };

        {
            let clock = Arc::new(ManualClock::default());
            let cache =
                DiskCache::open(Arc::new(config.clone()), clock as SharedClock).unwrap();
            assert!(cache.set("k", b"persisted", None, false));
        }

        let clock = Arc::new(ManualClock::default());
        let cache = DiskCache::open(Arc::new(config), clock as SharedClock).unwrap();
        assert_eq!(cache.get("k").unwrap().as_ref(), b"persisted");
        assert_eq!(cache.size_bytes(), 9);
    }

    #[test]
    fn test_no_tmp_files_after_writes() {
        let (cache, _, temp) = open_cache(no_compression());

        for i in 0..10 {
            assert!(cache.set(&format!("k{}", i), &vec![i as u8; 256], None, false));
        }

        let tmp_files: Vec<_> = fs::read_dir(temp.path().join(DATA_DIR))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension() == Some(std::ffi::OsStr::new("tmp")))
            .collect();
        assert!(tmp_files.is_empty());
    }

    #[test]
    fn test_interrupted_write_recovers_as_clean_miss() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            disk_cache_dir: temp.path().to_path_buf(),
            cleanup_interval_secs: 0,
            compression_enabled: false,
            ..Default::default()
        };

        // Simulate a crash between temp write and rename: the temp file
        // exists, the index has no row
        let data_dir = temp.path().join(DATA_DIR);
        {
            let clock = Arc::new(ManualClock::default());
            let _cache =
                DiskCache::open(Arc::new(config.clone()), clock as SharedClock).unwrap();
            fs::write(data_dir.join("deadbeef.bin.tmp"), b"partial").unwrap();
        }

        let clock = Arc::new(ManualClock::default());
        let cache = DiskCache::open(Arc::new(config), clock as SharedClock).unwrap();

        assert!(cache.get("in-flight").is_none());
        assert!(!data_dir.join("deadbeef.bin.tmp").exists());
    }

    #[test]
    fn test_missing_content_file_prunes_row_at_open() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            disk_cache_dir: temp.path().to_path_buf(),
            cleanup_interval_secs: 0,
            compression_enabled: false,
            ..Default::default()
        };

        {
            let clock = Arc::new(ManualClock::default());
            let cache =
                DiskCache::open(Arc::new(config.clone()), clock as SharedClock).unwrap();
            assert!(cache.set("k", b"value", None, false));
            let filename = cache.metadata("k").unwrap().filename;
            fs::remove_file(temp.path().join(DATA_DIR).join(filename)).unwrap();
        }

        let clock = Arc::new(ManualClock::default());
        let cache = DiskCache::open(Arc::new(config), clock as SharedClock).unwrap();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_corrupt_content_self_heals() {
        let (cache, _, temp) = open_cache(CacheConfig {
            compression_enabled: true,
            compression_threshold: 16,
            ..Default::default()
        });

        let payload = b"compressible compressible compressible compressible".repeat(4);
        assert!(cache.set("k", &payload, None, false));
        assert!(cache.metadata("k").unwrap().compressed);

        // Scribble over the blob so decompression fails
        let filename = cache.metadata("k").unwrap().filename;
        fs::write(temp.path().join(DATA_DIR).join(&filename), b"\xff\xfe garbage").unwrap();

        assert!(cache.get("k").is_none());
        // Entry evicted, not just missed
        assert_eq!(cache.len(), 0);
        assert!(!cache.exists("k"));
    }

    #[test]
    fn test_compression_threshold_behavior() {
        let (cache, _, _temp) = open_cache(CacheConfig {
            compression_enabled: true,
            compression_threshold: 100,
            ..Default::default()
        });

        let big = b"zzzzzzzzzz".repeat(50);
        assert!(cache.set("big", &big, None, false));
        let row = cache.metadata("big").unwrap();
        assert!(row.compressed);
        assert!(row.compression_ratio < 1.0);

        let small = vec![b'z'; 50];
        assert!(cache.set("small", &small, None, false));
        let row = cache.metadata("small").unwrap();
        assert!(!row.compressed);
        assert_eq!(row.compression_ratio, 1.0);

        // Both read back intact
        assert_eq!(cache.get("big").unwrap().as_ref(), &big[..]);
        assert_eq!(cache.get("small").unwrap().as_ref(), &small[..]);
    }

    #[test]
    fn test_forced_compression_ignores_threshold() {
        let (cache, _, _temp) = open_cache(CacheConfig {
            compression_enabled: true,
            compression_threshold: 10_000,
            ..Default::default()
        });

        let payload = b"abababababababababababababababab".repeat(4);
        assert!(cache.set("k", &payload, None, true));
        assert!(cache.metadata("k").unwrap().compressed);
    }

    #[test]
    fn test_ttl_expiry() {
        let (cache, clock, _temp) = open_cache(no_compression());

        assert!(cache.set("k", b"value", Some(60), false));
        clock.advance(59);
        assert!(cache.get("k").is_some());

        clock.advance(2);
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_exists_does_not_mutate_stats() {
        let (cache, clock, _temp) = open_cache(no_compression());

        cache.set("k", b"value", Some(60), false);
        assert!(cache.exists("k"));

        clock.advance(61);
        assert!(!cache.exists("k"));

        let row = cache.metadata("k");
        // exists neither touched the row nor removed it
        assert_eq!(row.unwrap().access_count, 0);
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_sweep_removes_rows_and_files() {
        let (cache, clock, temp) = open_cache(no_compression());

        cache.set("dead1", b"v", Some(10), false);
        cache.set("dead2", b"v", Some(10), false);
        cache.set("live", b"v", Some(1000), false);
        clock.advance(11);

        assert_eq!(cache.sweep_expired(), 2);
        assert_eq!(cache.len(), 1);

        // Exactly one content blob remains
        let blobs = fs::read_dir(temp.path().join(DATA_DIR))
            .unwrap()
            .filter_map(|e| e.ok())
            .count();
        assert_eq!(blobs, 1);
    }

    #[test]
    fn test_eviction_on_overflow_lru() {
        let (cache, _, _temp) = open_cache(CacheConfig {
            disk_limit: 1800,
            eviction_policy: EvictionPolicy::Lru,
            compression_enabled: false,
            ..Default::default()
        });

        assert!(cache.set("a", &[0u8; 600], None, false));
        assert!(cache.set("b", &[0u8; 600], None, false));
        assert!(cache.set("c", &[0u8; 600], None, false));

        cache.get("a");

        assert!(cache.set("d", &[0u8; 600], None, false));

        assert!(cache.exists("a"));
        assert!(!cache.exists("b"));
        assert!(cache.exists("c"));
        assert!(cache.exists("d"));
        assert!(cache.size_bytes() <= 1800);
    }

    #[test]
    fn test_eviction_on_overflow_fifo() {
        let (cache, _, _temp) = open_cache(CacheConfig {
            disk_limit: 1800,
            eviction_policy: EvictionPolicy::Fifo,
            compression_enabled: false,
            ..Default::default()
        });

        assert!(cache.set("a", &[0u8; 600], None, false));
        assert!(cache.set("b", &[0u8; 600], None, false));
        assert!(cache.set("c", &[0u8; 600], None, false));
        cache.get("a");
        cache.get("a");

        assert!(cache.set("d", &[0u8; 600], None, false));
        assert!(!cache.exists("a"));
        assert!(cache.exists("d"));
    }

    #[test]
    fn test_oversized_value_rejected() {
        let (cache, _, _temp) = open_cache(CacheConfig {
            disk_limit: 100,
            compression_enabled: false,
            ..Default::default()
        });

        assert!(!cache.set("big", &[0u8; 101], None, false));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replace_accounts_size_delta() {
        let (cache, _, _temp) = open_cache(no_compression());

        cache.set("k", &[0u8; 100], None, false);
        assert_eq!(cache.size_bytes(), 100);

        cache.set("k", &[0u8; 40], None, false);
        assert_eq!(cache.size_bytes(), 40);
        assert_eq!(cache.len(), 1);

        // Tracked total matches the index recount
        assert_eq!(cache.size_bytes(), cache.inner.index.total_size().unwrap());
    }

    #[test]
    fn test_delete_idempotent() {
        let (cache, _, _temp) = open_cache(no_compression());

        cache.set("k", b"v", None, false);
        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_keys_skips_expired() {
        let (cache, clock, _temp) = open_cache(no_compression());

        cache.set("live", b"v", Some(100), false);
        cache.set("dead", b"v", Some(10), false);
        clock.advance(50);

        assert_eq!(cache.keys(), vec!["live".to_string()]);
    }

    #[test]
    fn test_clear() {
        let (cache, _, temp) = open_cache(no_compression());

        for i in 0..5 {
            cache.set(&format!("k{}", i), b"v", None, false);
        }
        cache.clear().unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
        let blobs = fs::read_dir(temp.path().join(DATA_DIR)).unwrap().count();
        assert_eq!(blobs, 0);
    }
}
