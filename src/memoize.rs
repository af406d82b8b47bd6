//! Function-Result Memoization
//!
//! Thin wrapper over [`CacheManager`] that caches the results of a
//! computation under keys derived from its fully-qualified name and an
//! explicit key-builder closure. Arguments never pass through signature
//! introspection: the caller supplies the pure function that turns an
//! argument value into a key string (and thereby chooses which arguments
//! participate).
//!
//! Failures can optionally be cached as tagged values and re-surfaced as
//! errors on a hit, so a persistently failing computation is not retried on
//! every call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratacache::{CacheConfig, CacheManager};
//! use stratacache::memoize::Memoized;
//!
//! let manager = Arc::new(CacheManager::new(CacheConfig::default()).unwrap());
//!
//! let word_count = Memoized::new(
//!     "analysis::word_count",
//!     manager,
//!     |text: &String| text.clone(),
//!     |text: &String| Ok(text.split_whitespace().count() as u64),
//! );
//!
//! assert_eq!(word_count.call(&"a b c".to_string()).unwrap(), 3);
//! // Second call is served from the cache
//! assert_eq!(word_count.call(&"a b c".to_string()).unwrap(), 3);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::manager::{CacheManager, SetOptions};

/// Errors surfaced by a memoized call
#[derive(Error, Debug)]
pub enum MemoizeError {
    /// The computation failed on this call
    #[error("computation failed: {0}")]
    Computation(String),

    /// A previously cached failure was replayed
    #[error("cached failure: {0}")]
    CachedFailure(String),

    /// The result could not be encoded or decoded for caching
    #[error(transparent)]
    Cache(#[from] crate::error::Error),
}

/// Cached payload: either a value or a tagged failure
#[derive(Debug, Serialize, Deserialize)]
enum CachedOutcome<T> {
    Value(T),
    Error(String),
}

/// A memoized computation bound to one cache manager
pub struct Memoized<A, T, K, F>
where
    K: Fn(&A) -> String + Send + Sync,
    F: Fn(&A) -> std::result::Result<T, String> + Send + Sync,
    T: Serialize + DeserializeOwned,
{
    name: String,
    manager: Arc<CacheManager>,
    key_fn: K,
    func: F,
    ttl_secs: Option<u64>,
    cache_errors: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    _args: std::marker::PhantomData<fn(&A)>,
}

impl<A, T, K, F> Memoized<A, T, K, F>
where
    K: Fn(&A) -> String + Send + Sync,
    F: Fn(&A) -> std::result::Result<T, String> + Send + Sync,
    T: Serialize + DeserializeOwned,
{
    /// Wrap `func` under the fully-qualified `name`
    ///
    /// `key_fn` must be a pure function of the arguments; two argument
    /// values map to the same cache entry exactly when it returns the same
    /// string for both.
    pub fn new(name: impl Into<String>, manager: Arc<CacheManager>, key_fn: K, func: F) -> Self {
        Self {
            name: name.into(),
            manager,
            key_fn,
            func,
            ttl_secs: None,
            cache_errors: false,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            _args: std::marker::PhantomData,
        }
    }

    /// Override the TTL for cached results
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    /// Also cache failures, replaying them as errors on a hit
    pub fn with_error_caching(mut self) -> Self {
        self.cache_errors = true;
        self
    }

    /// Invoke the computation, serving from the cache when possible
    pub fn call(&self, args: &A) -> std::result::Result<T, MemoizeError> {
        let cache_key = self.cache_key(args);

        match self.manager.get_value::<CachedOutcome<T>>(&cache_key)? {
            Some(CachedOutcome::Value(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
            Some(CachedOutcome::Error(message)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Err(MemoizeError::CachedFailure(message));
            }
            None => {}
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let options = SetOptions {
            ttl_secs: self.ttl_secs,
            ..Default::default()
        };

        match (self.func)(args) {
            Ok(value) => {
                let outcome: CachedOutcome<&T> = CachedOutcome::Value(&value);
                self.manager.set_value(&cache_key, &outcome, options)?;
                Ok(value)
            }
            Err(message) => {
                if self.cache_errors {
                    let outcome: CachedOutcome<T> = CachedOutcome::Error(message.clone());
                    self.manager.set_value(&cache_key, &outcome, options)?;
                }
                Err(MemoizeError::Computation(message))
            }
        }
    }

    /// Drop the cached entry for one argument value; true if it existed
    pub fn invalidate(&self, args: &A) -> bool {
        self.manager.delete(&self.cache_key(args))
    }

    /// Drop every cached entry belonging to this function
    pub fn invalidate_all(&self) -> usize {
        self.manager
            .invalidate_pattern(&format!("{}:*", self.name))
    }

    /// Per-function cache effectiveness counters
    pub fn info(&self) -> MemoizedInfo {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        MemoizedInfo {
            name: self.name.clone(),
            hits,
            misses,
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// Derive the cache key for an argument value
    ///
    /// The key-builder output is hashed, so arbitrarily large argument
    /// encodings still produce short, prefix-scoped keys.
    fn cache_key(&self, args: &A) -> String {
        let derived = (self.key_fn)(args);
        let digest = blake3::hash(derived.as_bytes()).to_hex();
        format!("{}:{}", self.name, &digest[..16])
    }
}

/// Snapshot of one memoized function's counters
#[derive(Debug, Clone, Serialize)]
pub struct MemoizedInfo {
    /// Fully-qualified function name
    pub name: String,
    /// Calls served from the cache
    pub hits: u64,
    /// Calls that ran the computation
    pub misses: u64,
    /// hits / calls (0.0 before the first call)
    pub hit_ratio: f64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::CacheConfig;
    use std::sync::atomic::AtomicU64;
    use tempfile::TempDir;

    fn test_manager() -> (Arc<CacheManager>, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            disk_cache_dir: temp.path().to_path_buf(),
            cleanup_interval_secs: 0,
            ..Default::default()
        };
        (Arc::new(CacheManager::new(config).unwrap()), temp)
    }

    #[test]
    fn test_second_call_served_from_cache() {
        let (manager, _temp) = test_manager();
        let invocations = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&invocations);

        let double = Memoized::new(
            "math::double",
            manager,
            |n: &u64| n.to_string(),
            move |n: &u64| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(n * 2)
            },
        );

        assert_eq!(double.call(&21).unwrap(), 42);
        assert_eq!(double.call(&21).unwrap(), 42);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        let info = double.info();
        assert_eq!(info.hits, 1);
        assert_eq!(info.misses, 1);
        assert_eq!(info.hit_ratio, 0.5);
    }

    #[test]
    fn test_distinct_args_distinct_entries() {
        let (manager, _temp) = test_manager();

        let double = Memoized::new(
            "math::double",
            manager,
            |n: &u64| n.to_string(),
            |n: &u64| Ok(n * 2),
        );

        assert_eq!(double.call(&1).unwrap(), 2);
        assert_eq!(double.call(&2).unwrap(), 4);
        assert_eq!(double.info().misses, 2);
    }

    #[test]
    fn test_key_builder_controls_identity() {
        let (manager, _temp) = test_manager();
        let invocations = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&invocations);

        // Key-builder excludes the second tuple field, so it does not
        // participate in cache identity
        let lookup = Memoized::new(
            "posts::fetch",
            manager,
            |args: &(u64, String)| args.0.to_string(),
            move |args: &(u64, String)| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(format!("post-{}", args.0))
            },
        );

        assert_eq!(lookup.call(&(5, "trace-a".into())).unwrap(), "post-5");
        assert_eq!(lookup.call(&(5, "trace-b".into())).unwrap(), "post-5");
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_errors_not_cached_by_default() {
        let (manager, _temp) = test_manager();
        let invocations = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&invocations);

        let failing = Memoized::new(
            "flaky::op",
            manager,
            |n: &u64| n.to_string(),
            move |_: &u64| -> std::result::Result<u64, String> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("boom".into())
            },
        );

        assert!(matches!(
            failing.call(&1),
            Err(MemoizeError::Computation(_))
        ));
        assert!(matches!(
            failing.call(&1),
            Err(MemoizeError::Computation(_))
        ));
        // Re-invoked each time
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_error_caching_replays_failure() {
        let (manager, _temp) = test_manager();
        let invocations = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&invocations);

        let failing = Memoized::new(
            "flaky::op",
            manager,
            |n: &u64| n.to_string(),
            move |_: &u64| -> std::result::Result<u64, String> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("boom".into())
            },
        )
        .with_error_caching();

        assert!(matches!(
            failing.call(&1),
            Err(MemoizeError::Computation(_))
        ));
        // Replayed from the cache without re-invoking
        assert!(matches!(
            failing.call(&1),
            Err(MemoizeError::CachedFailure(_))
        ));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_single_entry() {
        let (manager, _temp) = test_manager();
        let invocations = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&invocations);

        let double = Memoized::new(
            "math::double",
            manager,
            |n: &u64| n.to_string(),
            move |n: &u64| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(n * 2)
            },
        );

        double.call(&1).unwrap();
        assert!(double.invalidate(&1));
        double.call(&1).unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidate_all_is_scoped_to_function() {
        let (manager, _temp) = test_manager();

        let double = Memoized::new(
            "math::double",
            Arc::clone(&manager),
            |n: &u64| n.to_string(),
            |n: &u64| Ok(n * 2),
        );
        let triple = Memoized::new(
            "math::triple",
            Arc::clone(&manager),
            |n: &u64| n.to_string(),
            |n: &u64| Ok(n * 3),
        );

        double.call(&1).unwrap();
        double.call(&2).unwrap();
        triple.call(&1).unwrap();

        assert_eq!(double.invalidate_all(), 2);

        // triple's entry survived: next call is a hit
        triple.call(&1).unwrap();
        assert_eq!(triple.info().hits, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        use crate::cache::clock::{ManualClock, SharedClock};

        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            disk_cache_dir: temp.path().to_path_buf(),
            cleanup_interval_secs: 0,
            ..Default::default()
        };
        let clock = Arc::new(ManualClock::default());
        let manager =
            Arc::new(CacheManager::with_clock(config, clock.clone() as SharedClock).unwrap());

        let invocations = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&invocations);

        let op = Memoized::new(
            "ttl::op",
            manager,
            |n: &u64| n.to_string(),
            move |n: &u64| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(*n)
            },
        )
        .with_ttl(30);

        op.call(&1).unwrap();
        clock.advance(29);
        op.call(&1).unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        clock.advance(5);
        op.call(&1).unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }
}
