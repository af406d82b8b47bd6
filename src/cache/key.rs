//! Physical Key Derivation
//!
//! Callers address the cache with logical keys. Before either tier sees a
//! key, the manager rewrites it into a physical key carrying the configured
//! cache version, so that bumping the version logically invalidates every
//! prior entry without touching storage. Over-long physical keys collapse to
//! a fixed-length content hash, which also bounds filename length on disk.

/// Length of a collapsed key: blake3 hex digest
pub const COLLAPSED_KEY_LEN: usize = 64;

/// Derive the physical key for a logical key under `version`
///
/// The uncollapsed form is `v{version}:{logical}`; if that exceeds
/// `max_key_length` it is replaced by its blake3 hex digest.
pub fn physical_key(logical: &str, version: &str, max_key_length: usize) -> String {
    let full = format!("v{}:{}", version, logical);
    if full.len() > max_key_length {
        collapse(&full)
    } else {
        full
    }
}

/// Recover the logical key from an uncollapsed physical key
///
/// Returns `None` for keys under a different version and for collapsed
/// (hashed) keys, which are not reversible.
pub fn logical_key<'a>(physical: &'a str, version: &str) -> Option<&'a str> {
    let prefix_len = version.len() + 2; // "v" + version + ":"
    if physical.len() > prefix_len
        && physical.as_bytes()[0] == b'v'
        && physical[1..].starts_with(version)
        && physical.as_bytes()[prefix_len - 1] == b':'
    {
        Some(&physical[prefix_len..])
    } else {
        None
    }
}

/// Deterministic content filename for a physical key
///
/// The version is already inside the physical key, so filenames never
/// collide across cache versions.
pub fn content_filename(physical: &str) -> String {
    format!("{}.bin", collapse(physical))
}

fn collapse(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

// =============================================================================
// Tests
// =============================================================================
