//! Disk Tier Metadata Index
//!
//! Embedded SQLite store mapping physical cache keys to content filenames
//! and entry metadata. The index is the source of truth for the disk tier:
//! a content file with no matching row is garbage.
//!
//! All statements run behind one connection lock, so index mutations are
//! serialized; the disk tier composes this with its own operation lock for
//! compound read-modify-write sequences.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::config::EvictionPolicy;
use crate::error::Result;

/// One metadata row, mirroring the `entries` table
#[derive(Debug, Clone)]
pub struct IndexRow {
    /// Physical cache key (primary key)
    pub key: String,
    /// Content blob filename within the data directory
    pub filename: String,
    /// Creation timestamp (epoch seconds)
    pub created_at: u64,
    /// Last access timestamp (epoch seconds)
    pub last_accessed: u64,
    /// Number of hits served
    pub access_count: u64,
    /// TTL in seconds (0 = no expiry)
    pub ttl_secs: u64,
    /// Stored (possibly compressed) size in bytes
    pub size_bytes: u64,
    /// Whether the content file is compressed
    pub compressed: bool,
    /// Stored size / original size (1.0 when uncompressed)
    pub compression_ratio: f64,
}

/// SQLite-backed metadata index
pub struct DiskIndex {
    conn: Mutex<Connection>,
}

impl DiskIndex {
    /// Open (or create) the index file at the given path
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init_schema()?;
        Ok(index)
    }

    /// Create an in-memory index (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init_schema()?;
        Ok(index)
    }

    /// Initialize database schema
    ///
    /// `touch_seq` is a monotonic stamp ordering accesses within one clock
    /// second, where `last_accessed` alone cannot.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_accessed INTEGER NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                ttl_secs INTEGER NOT NULL DEFAULT 0,
                size_bytes INTEGER NOT NULL,
                compressed BOOLEAN NOT NULL DEFAULT 0,
                compression_ratio REAL NOT NULL DEFAULT 1.0,
                touch_seq INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_last_accessed
             ON entries (last_accessed)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_created_at
             ON entries (created_at)",
            [],
        )?;
        Ok(())
    }

    /// Insert or replace a row, stamped with `touch_seq`
    pub fn upsert(&self, row: &IndexRow, touch_seq: u64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO entries
             (key, filename, created_at, last_accessed, access_count,
              ttl_secs, size_bytes, compressed, compression_ratio, touch_seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                row.key,
                row.filename,
                row.created_at,
                row.last_accessed,
                row.access_count,
                row.ttl_secs,
                row.size_bytes,
                row.compressed,
                row.compression_ratio,
                touch_seq,
            ],
        )?;
        Ok(())
    }

    /// Look up a row by key
    pub fn get(&self, key: &str) -> Result<Option<IndexRow>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT key, filename, created_at, last_accessed, access_count,
                        ttl_secs, size_bytes, compressed, compression_ratio
                 FROM entries WHERE key = ?1",
                params![key],
                row_from,
            )
            .optional()?;
        Ok(row)
    }

    /// Record a hit: bump recency and frequency bookkeeping
    pub fn touch(&self, key: &str, now: u64, touch_seq: u64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE entries
             SET last_accessed = ?2, access_count = access_count + 1, touch_seq = ?3
             WHERE key = ?1",
            params![key, now, touch_seq],
        )?;
        Ok(())
    }

    /// Highest touch stamp recorded so far (0 for an empty index)
    pub fn max_touch_seq(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let max: u64 = conn.query_row(
            "SELECT COALESCE(MAX(touch_seq), 0) FROM entries",
            [],
            |r| r.get(0),
        )?;
        Ok(max)
    }

    /// Remove a row, returning it if it was present
    pub fn remove(&self, key: &str) -> Result<Option<IndexRow>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "DELETE FROM entries WHERE key = ?1
                 RETURNING key, filename, created_at, last_accessed, access_count,
                           ttl_secs, size_bytes, compressed, compression_ratio",
                params![key],
                row_from,
            )
            .optional()?;
        Ok(row)
    }

    /// Check for a live (non-expired) row without mutating access stats
    pub fn contains_live(&self, key: &str, now: u64) -> Result<bool> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM entries
             WHERE key = ?1 AND (ttl_secs = 0 OR created_at + ttl_secs >= ?2)",
            params![key, now],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Keys of all live (non-expired) rows
    pub fn live_keys(&self, now: u64) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key FROM entries
             WHERE ttl_secs = 0 OR created_at + ttl_secs >= ?1",
        )?;
        let keys = stmt
            .query_map(params![now], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    /// Rows whose TTL has lapsed
    pub fn expired(&self, now: u64) -> Result<Vec<IndexRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key, filename, created_at, last_accessed, access_count,
                    ttl_secs, size_bytes, compressed, compression_ratio
             FROM entries
             WHERE ttl_secs > 0 AND created_at + ttl_secs < ?1",
        )?;
        let rows = stmt
            .query_map(params![now], row_from)?
            .collect::<rusqlite::Result<Vec<IndexRow>>>()?;
        Ok(rows)
    }

    /// Sum of stored sizes across all rows
    pub fn total_size(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let total: u64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM entries",
            [],
            |r| r.get(0),
        )?;
        Ok(total)
    }

    /// Number of rows
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
        Ok(count)
    }

    /// Rows in eviction order for the given policy
    ///
    /// Ties within one clock second are broken by insertion order (rowid).
    pub fn eviction_candidates(&self, policy: EvictionPolicy) -> Result<Vec<IndexRow>> {
        let order = match policy {
            EvictionPolicy::Lru => "last_accessed ASC, touch_seq ASC",
            EvictionPolicy::Lfu => "access_count ASC, last_accessed ASC, touch_seq ASC",
            EvictionPolicy::Fifo => "created_at ASC, rowid ASC",
        };
        let sql = format!(
            "SELECT key, filename, created_at, last_accessed, access_count,
                    ttl_secs, size_bytes, compressed, compression_ratio
             FROM entries ORDER BY {}",
            order
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], row_from)?
            .collect::<rusqlite::Result<Vec<IndexRow>>>()?;
        Ok(rows)
    }

    /// All content filenames currently referenced by the index
    pub fn filenames(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT filename FROM entries")?;
        let names = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Remove rows referencing a content filename (startup recovery)
    pub fn remove_by_filename(&self, filename: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM entries WHERE filename = ?1",
            params![filename],
        )?;
        Ok(removed as u64)
    }

    /// Drop every row
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM entries", [])?;
        Ok(())
    }
}

fn row_from(r: &rusqlite::Row<'_>) -> rusqlite::Result<IndexRow> {
    Ok(IndexRow {
        key: r.get(0)?,
        filename: r.get(1)?,
        created_at: r.get(2)?,
        last_accessed: r.get(3)?,
        access_count: r.get(4)?,
        ttl_secs: r.get(5)?,
        size_bytes: r.get(6)?,
        compressed: r.get(7)?,
        compression_ratio: r.get(8)?,
    })
}

// =============================================================================
// Tests
// =============================================================================
