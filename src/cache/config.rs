//! Cache Configuration
//!
//! A single validated configuration record shared by both tiers and the
//! manager. Constructible from defaults, from a JSON object literal, or from
//! environment variables, with named presets for common deployments.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default memory tier budget (100MB)
pub const DEFAULT_MEMORY_LIMIT: u64 = 100 * 1024 * 1024;

/// Default disk tier budget (1GB)
pub const DEFAULT_DISK_LIMIT: u64 = 1024 * 1024 * 1024;

/// Default TTL for entries set without one (1 hour)
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default ceiling for explicit TTLs (24 hours)
pub const DEFAULT_MAX_TTL_SECS: u64 = 86400;

/// Eviction policy applied when a tier exceeds its byte budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the least-recently-accessed entry first
    Lru,
    /// Evict the least-frequently-accessed entry first, ties broken by
    /// oldest last access
    Lfu,
    /// Evict the oldest entry (by creation time) first
    Fifo,
}

impl EvictionPolicy {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
        }
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::Lru
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EvictionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            other => Err(Error::Config(format!(
                "unknown eviction policy '{}' (expected lru, lfu, or fifo)",
                other
            ))),
        }
    }
}

/// Engine configuration, immutable after validation
///
/// All byte and time fields are unsigned, so non-negativity holds by
/// construction; `validate` enforces the cross-field invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory tier byte budget
    pub memory_limit: u64,
    /// Whether the memory tier participates at all
    pub memory_cache_enabled: bool,

    /// Directory holding the metadata index and content blobs
    pub disk_cache_dir: PathBuf,
    /// Disk tier byte budget (content bytes, as recorded in the index)
    pub disk_limit: u64,
    /// Whether the disk tier participates at all
    pub disk_cache_enabled: bool,

    /// TTL applied when `set` is called without one (0 = entries never expire)
    pub default_ttl_secs: u64,
    /// Ceiling for explicit non-zero TTLs
    pub max_ttl_secs: u64,

    /// Whether the disk tier compresses large payloads
    pub compression_enabled: bool,
    /// Minimum payload size eligible for compression
    pub compression_threshold: u64,
    /// LZ4 high-compression level, 1 (fast) to 9 (dense)
    pub compression_level: u32,

    /// Physical keys longer than this are collapsed to a fixed-length hash
    pub max_key_length: usize,

    /// Period of the background expiry sweeps (0 disables sweeping)
    pub cleanup_interval_secs: u64,

    /// Policy used when a tier must evict to fit a new entry
    pub eviction_policy: EvictionPolicy,

    /// Version tag embedded into every physical key; bumping it logically
    /// invalidates all prior entries without deleting them
    pub cache_version: String,

    /// Run the background warming thread that promotes recently-set
    /// disk-resident keys into memory
    pub warming_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            memory_cache_enabled: true,
            disk_cache_dir: PathBuf::from(".stratacache"),
            disk_limit: DEFAULT_DISK_LIMIT,
            disk_cache_enabled: true,
            default_ttl_secs: DEFAULT_TTL_SECS,
            max_ttl_secs: DEFAULT_MAX_TTL_SECS,
            compression_enabled: true,
            compression_threshold: 1024,
            compression_level: 4,
            max_key_length: 512,
            cleanup_interval_secs: 300,
            eviction_policy: EvictionPolicy::default(),
            cache_version: "1.0".to_string(),
            warming_enabled: false,
        }
    }
}

impl CacheConfig {
    /// Validate cross-field invariants, failing fast with no partial state
    pub fn validate(&self) -> Result<()> {
        if !(1..=9).contains(&self.compression_level) {
            return Err(Error::Config(format!(
                "compression_level must be in [1, 9], got {}",
                self.compression_level
            )));
        }
        if self.max_ttl_secs < self.default_ttl_secs {
            return Err(Error::Config(format!(
                "max_ttl_secs ({}) must be >= default_ttl_secs ({})",
                self.max_ttl_secs, self.default_ttl_secs
            )));
        }
        if self.cache_version.is_empty() {
            return Err(Error::Config("cache_version must not be empty".into()))
        }
        // A collapsed key is a 64-char blake3 hex digest; anything shorter
        // could never be stored under its own collapse
        if self.max_key_length < 64 {
            return Err(Error::Config(format!(
                "max_key_length must be >= 64, got {}",
                self.max_key_length
            )));
        }
        Ok(())
    }

    /// Validate and return self, for chaining at construction sites
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Resolve the effective TTL for a `set` call
    ///
    /// `None` falls back to the default; non-zero values clamp to the
    /// ceiling; 0 (never expire) passes through unclamped.
    pub fn resolve_ttl(&self, explicit: Option<u64>) -> u64 {
        let ttl = explicit.unwrap_or(self.default_ttl_secs);
        if ttl == 0 {
            0
        } else {
            ttl.min(self.max_ttl_secs)
        }
    }

    /// Build from a JSON object literal
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid config JSON: {}", e)))?;
        config.validated()
    }

    /// Build from `<PREFIX>_CACHE_<SETTING>` environment variables
    ///
    /// Unset variables keep their defaults. Booleans parse `"true"`
    /// case-insensitively; anything else is false.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let mut config = Self::default();
        let var = |setting: &str| env::var(format!("{}_CACHE_{}", prefix, setting)).ok();

        if let Some(v) = var("MEMORY_LIMIT") {
            config.memory_limit = parse_number(&v, "MEMORY_LIMIT")?;
        }
        if let Some(v) = var("MEMORY_ENABLED") {
            config.memory_cache_enabled = parse_bool(&v);
        }
        if let Some(v) = var("DISK_DIR") {
            config.disk_cache_dir = PathBuf::from(v);
        }
        if let Some(v) = var("DISK_LIMIT") {
            config.disk_limit = parse_number(&v, "DISK_LIMIT")?;
        }
        if let Some(v) = var("DISK_ENABLED") {
            config.disk_cache_enabled = parse_bool(&v);
        }
        if let Some(v) = var("DEFAULT_TTL") {
            config.default_ttl_secs = parse_number(&v, "DEFAULT_TTL")?;
        }
        if let Some(v) = var("MAX_TTL") {
            config.max_ttl_secs = parse_number(&v, "MAX_TTL")?;
        }
        if let Some(v) = var("COMPRESSION_ENABLED") {
            config.compression_enabled = parse_bool(&v);
        }
        if let Some(v) = var("COMPRESSION_THRESHOLD") {
            config.compression_threshold = parse_number(&v, "COMPRESSION_THRESHOLD")?;
        }
        if let Some(v) = var("COMPRESSION_LEVEL") {
            config.compression_level = parse_number(&v, "COMPRESSION_LEVEL")? as u32;
        }
        if let Some(v) = var("MAX_KEY_LENGTH") {
            config.max_key_length = parse_number(&v, "MAX_KEY_LENGTH")? as usize;
        }
        if let Some(v) = var("CLEANUP_INTERVAL") {
            config.cleanup_interval_secs = parse_number(&v, "CLEANUP_INTERVAL")?;
        }
        if let Some(v) = var("EVICTION_POLICY") {
            config.eviction_policy = v.parse()?;
        }
        if let Some(v) = var("VERSION") {
            config.cache_version = v;
        }
        if let Some(v) = var("WARMING_ENABLED") {
            config.warming_enabled = parse_bool(&v);
        }

        config.validated()
    }

    // =========================================================================
    // Presets
    // =========================================================================

    /// Development preset: small budgets, short TTLs, frequent sweeps,
    /// so stale state never survives an edit-run cycle for long
    pub fn development() -> Self {
        Self {
            memory_limit: 16 * 1024 * 1024,
            disk_limit: 128 * 1024 * 1024,
            default_ttl_secs: 300,
            max_ttl_secs: 3600,
            cleanup_interval_secs: 60,
            cache_version: "dev".to_string(),
            ..Self::default()
        }
    }

    /// Production preset: generous budgets, long TTLs, warming on
    pub fn production() -> Self {
        Self {
            memory_limit: 512 * 1024 * 1024,
            disk_limit: 8 * 1024 * 1024 * 1024,
            default_ttl_secs: 3600,
            max_ttl_secs: 7 * 86400,
            warming_enabled: true,
            ..Self::default()
        }
    }

    /// Memory-constrained preset: tiny RAM footprint, disk does the work,
    /// aggressive compression
    pub fn memory_constrained() -> Self {
        Self {
            memory_limit: 4 * 1024 * 1024,
            disk_limit: 2 * 1024 * 1024 * 1024,
            compression_threshold: 256,
            compression_level: 9,
            eviction_policy: EvictionPolicy::Lru,
            ..Self::default()
        }
    }

    /// High-performance preset: compression off to avoid CPU overhead on
    /// the write path, large memory tier
    pub fn high_performance() -> Self {
        Self {
            memory_limit: 1024 * 1024 * 1024,
            compression_enabled: false,
            warming_enabled: true,
            ..Self::default()
        }
    }

    /// Minimal preset: memory tier only, no disk persistence at all
    pub fn minimal() -> Self {
        Self {
            memory_limit: 32 * 1024 * 1024,
            disk_cache_enabled: false,
            compression_enabled: false,
            cleanup_interval_secs: 0,
            ..Self::default()
        }
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

fn parse_number(value: &str, setting: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got '{}'", setting, value)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        for preset in [
            CacheConfig::development(),
            CacheConfig::production(),
            CacheConfig::memory_constrained(),
            CacheConfig::high_performance(),
            CacheConfig::minimal(),
        ] {
            assert!(preset.validate().is_ok(), "invalid preset: {:?}", preset);
        }
    }

    #[test]
    fn test_minimal_disables_disk() {
        let config = CacheConfig::minimal();
        assert!(!config.disk_cache_enabled);
        assert!(config.memory_cache_enabled);
    }

    #[test]
    fn test_high_performance_disables_compression() {
        assert!(!CacheConfig::high_performance().compression_enabled);
    }

    #[test]
    fn test_invalid_compression_level() {
        let config = CacheConfig {
            compression_level: 0,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let config = CacheConfig {
            compression_level: 10,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_invalid_ttl_ordering() {
        let config = CacheConfig {
            default_ttl_secs: 7200,
            max_ttl_secs: 3600,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_empty_version_rejected() {
        let config = CacheConfig {
            cache_version: String::new(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_ttl_resolution() {
        let config = CacheConfig {
            default_ttl_secs: 600,
            max_ttl_secs: 3600,
            ..Default::default()
        };

        assert_eq!(config.resolve_ttl(None), 600);
        assert_eq!(config.resolve_ttl(Some(120)), 120);
        // Clamped to the ceiling
        assert_eq!(config.resolve_ttl(Some(10_000)), 3600);
        // 0 = never expire, not clamped
        assert_eq!(config.resolve_ttl(Some(0)), 0);
    }

    #[test]
    fn test_eviction_policy_parsing() {
        assert_eq!("lru".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lru);
        assert_eq!("LFU".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lfu);
        assert_eq!("Fifo".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Fifo);
        assert!("arc".parse::<EvictionPolicy>().is_err());
    }

    #[test]
    fn test_from_json_literal() {
        let config = CacheConfig::from_json_str(
            r#"{
                "memory_limit": 1024,
                "eviction_policy": "lfu",
                "cache_version": "2.1",
                "disk_cache_enabled": false
            }"#,
        )
        .unwrap();

        assert_eq!(config.memory_limit, 1024);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lfu);
        assert_eq!(config.cache_version, "2.1");
        assert!(!config.disk_cache_enabled);
        // Unspecified fields keep defaults
        assert_eq!(config.max_key_length, 512);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let result = CacheConfig::from_json_str(r#"{"compression_level": 12}"#);
        assert_matches!(result, Err(Error::Config(_)));
    }

    #[test]
    fn test_from_env() {
        // Unique prefix per test to avoid cross-test interference
        env::set_var("STC_T1_CACHE_MEMORY_LIMIT", "2048");
        env::set_var("STC_T1_CACHE_EVICTION_POLICY", "fifo");
        env::set_var("STC_T1_CACHE_COMPRESSION_ENABLED", "TRUE");
        env::set_var("STC_T1_CACHE_DISK_ENABLED", "nope");

        let config = CacheConfig::from_env("STC_T1").unwrap();
        assert_eq!(config.memory_limit, 2048);
        assert_eq!(config.eviction_policy, EvictionPolicy::Fifo);
        assert!(config.compression_enabled);
        assert!(!config.disk_cache_enabled);

        env::remove_var("STC_T1_CACHE_MEMORY_LIMIT");
        env::remove_var("STC_T1_CACHE_EVICTION_POLICY");
        env::remove_var("STC_T1_CACHE_COMPRESSION_ENABLED");
        env::remove_var("STC_T1_CACHE_DISK_ENABLED");
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        env::set_var("STC_T2_CACHE_MEMORY_LIMIT", "lots");
        let result = CacheConfig::from_env("STC_T2");
        assert_matches!(result, Err(Error::Config(_)));
        env::remove_var("STC_T2_CACHE_MEMORY_LIMIT");
    }
}
