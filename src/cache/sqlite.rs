//! SQLite-backed diagnosis cache.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};

use super::{CacheEntry, CacheStats, Clock, SystemClock};
use crate::error::CacheError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS diagnosis_cache (
        hash TEXT PRIMARY KEY,
        diagnosis TEXT NOT NULL,
        confidence REAL NOT NULL,
        created_at INTEGER NOT NULL,
        accessed_at INTEGER NOT NULL,
        hit_count INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_diagnosis_cache_created_at
        ON diagnosis_cache(created_at);
";

/// Diagnosis cache on a single SQLite connection.
///
/// Writes are serialised by the connection mutex, and `set` is a
/// last-write-wins upsert. The `try_*` methods surface errors; the plain
/// methods log them and degrade to "no entry" or zero.
pub struct DiagnosisCache {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl DiagnosisCache {
    /// Opens (or creates) the cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::CreateDir`] if the parent directory cannot be
    /// created, or [`CacheError::Sqlite`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened diagnosis cache");
        Self::with_connection(conn)
    }

    /// Opens a private in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Sqlite`] if SQLite cannot allocate it.
    pub fn in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    /// Looks up `key`, deleting the row if it is older than `ttl`.
    ///
    /// A hit bumps `hit_count` and `accessed_at`; the returned entry
    /// carries the updated count.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    pub fn try_get(&self, key: &str, ttl: Duration) -> Result<Option<CacheEntry>, CacheError> {
        let conn = self.lock()?;
        let now = self.clock.now();

        let row = conn
            .query_row(
                "SELECT diagnosis, confidence, created_at, hit_count
                 FROM diagnosis_cache WHERE hash = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((diagnosis, confidence, created_at, hit_count)) = row else {
            return Ok(None);
        };

        if now.saturating_sub(created_at) >= ttl_secs(ttl) {
            conn.execute("DELETE FROM diagnosis_cache WHERE hash = ?1", params![key])?;
            tracing::debug!(key, "cache entry expired");
            return Ok(None);
        }

        conn.execute(
            "UPDATE diagnosis_cache
             SET accessed_at = ?1, hit_count = hit_count + 1
             WHERE hash = ?2",
            params![now, key],
        )?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            diagnosis,
            confidence,
            created_at,
            hit_count: u64::try_from(hit_count).unwrap_or(0) + 1,
        }))
    }

    /// Inserts or replaces the entry for `key`, resetting its hit count.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    pub fn try_set(&self, key: &str, diagnosis: &str, confidence: f64) -> Result<(), CacheError> {
        let conn = self.lock()?;
        let now = self.clock.now();
        conn.execute(
            "INSERT INTO diagnosis_cache
                 (hash, diagnosis, confidence, created_at, accessed_at, hit_count)
             VALUES (?1, ?2, ?3, ?4, ?4, 0)
             ON CONFLICT(hash) DO UPDATE SET
                 diagnosis = excluded.diagnosis,
                 confidence = excluded.confidence,
                 created_at = excluded.created_at,
                 accessed_at = excluded.accessed_at,
                 hit_count = 0",
            params![key, diagnosis, confidence, now],
        )?;
        Ok(())
    }

    /// Deletes every entry older than `ttl`, returning how many went.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    pub fn try_clear_expired(&self, ttl: Duration) -> Result<usize, CacheError> {
        let conn = self.lock()?;
        let cutoff = self.clock.now().saturating_sub(ttl_secs(ttl));
        Ok(conn.execute(
            "DELETE FROM diagnosis_cache WHERE created_at <= ?1",
            params![cutoff],
        )?)
    }

    /// Deletes every entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    pub fn try_clear_all(&self) -> Result<usize, CacheError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM diagnosis_cache", [])?)
    }

    /// Aggregate statistics.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    pub fn try_stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.lock()?;
        let (count, hits) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(hit_count), 0) FROM diagnosis_cache",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let total_cached = u64::try_from(count).unwrap_or(0);
        let total_hits = u64::try_from(hits).unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        let average_hits = if total_cached == 0 {
            0.0
        } else {
            (total_hits as f64 / total_cached as f64 * 100.0).round() / 100.0
        };

        Ok(CacheStats {
            total_cached,
            total_hits,
            average_hits,
        })
    }

    /// Looks up `key`; storage errors read as a miss.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<CacheEntry> {
        self.try_get(key, ttl).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "cache read failed");
            None
        })
    }

    /// Stores a diagnosis; storage errors are logged and dropped.
    pub fn set(&self, key: &str, diagnosis: &str, confidence: f64) {
        if let Err(e) = self.try_set(key, diagnosis, confidence) {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }

    /// Removes expired entries; returns 0 on storage error.
    pub fn clear_expired(&self, ttl: Duration) -> usize {
        self.try_clear_expired(ttl).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cache prune failed");
            0
        })
    }

    /// Removes all entries; returns 0 on storage error.
    pub fn clear_all(&self) -> usize {
        self.try_clear_all().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cache clear failed");
            0
        })
    }

    /// Statistics; zeroed on storage error.
    pub fn stats(&self) -> CacheStats {
        self.try_stats().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cache stats failed");
            CacheStats::default()
        })
    }
}

impl std::fmt::Debug for DiagnosisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosisCache")
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, cache_key};

    const HOUR: Duration = Duration::from_secs(3600);

    fn cache_at(start: i64) -> (DiagnosisCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let cache = DiagnosisCache::in_memory()
            .unwrap_or_else(|_| unreachable!())
            .with_clock(clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_round_trip() {
        let (cache, _) = cache_at(1_000);
        let key = cache_key("chest pain");
        cache.set(&key, "D", 0.5);

        let entry = cache.get(&key, HOUR).unwrap_or_else(|| unreachable!());
        assert_eq!(entry.diagnosis, "D");
        assert!((entry.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(entry.created_at, 1_000);
        assert_eq!(entry.hit_count, 1);
    }

    #[test]
    fn test_expiry_deletes_row() {
        let (cache, clock) = cache_at(1_000);
        cache.set("k", "D", 1.0);

        clock.advance(3_599);
        assert!(cache.get("k", HOUR).is_some());

        clock.advance(1);
        assert!(cache.get("k", HOUR).is_none());
        assert!(cache.get("k", HOUR).is_none());
        assert_eq!(cache.stats().total_cached, 0);

        // Row is gone, not merely hidden by the TTL.
        assert!(cache.get("k", Duration::from_secs(u64::MAX)).is_none());
    }

    #[test]
    fn test_hits_do_not_extend_ttl() {
        let (cache, clock) = cache_at(0);
        cache.set("k", "D", 1.0);
        for _ in 0..3 {
            clock.advance(1_000);
            assert!(cache.get("k", HOUR).is_some());
        }
        clock.advance(1_000);
        assert!(cache.get("k", HOUR).is_none());
    }

    #[test]
    fn test_upsert_resets_hits() {
        let (cache, clock) = cache_at(0);
        cache.set("k", "old", 0.2);
        let _ = cache.get("k", HOUR);
        let _ = cache.get("k", HOUR);

        clock.advance(10);
        cache.set("k", "new", 0.9);
        let entry = cache.get("k", HOUR).unwrap_or_else(|| unreachable!());
        assert_eq!(entry.diagnosis, "new");
        assert_eq!(entry.created_at, 10);
        assert_eq!(entry.hit_count, 1);
    }

    #[test]
    fn test_stats() {
        let (cache, _) = cache_at(0);
        assert_eq!(cache.stats(), CacheStats::default());

        cache.set("a", "A", 1.0);
        cache.set("b", "B", 1.0);
        cache.set("c", "C", 1.0);
        let _ = cache.get("a", HOUR);
        let _ = cache.get("a", HOUR);
        let _ = cache.get("b", HOUR);

        let stats = cache.stats();
        assert_eq!(stats.total_cached, 3);
        assert_eq!(stats.total_hits, 3);
        assert!((stats.average_hits - 1.0).abs() < f64::EPSILON);

        let _ = cache.get("c", HOUR);
        assert!((cache.stats().average_hits - 1.33).abs() < 1e-9);
    }

    #[test]
    fn test_clear_expired_and_all() {
        let (cache, clock) = cache_at(0);
        cache.set("old", "O", 1.0);
        clock.advance(100);
        cache.set("new", "N", 1.0);

        assert_eq!(cache.clear_expired(Duration::from_secs(100)), 1);
        assert!(cache.get("new", HOUR).is_some());
        assert_eq!(cache.clear_all(), 1);
        assert_eq!(cache.stats().total_cached, 0);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("nested/deeper/cache.db");

        let cache = DiagnosisCache::open(&path).unwrap_or_else(|_| unreachable!());
        cache.set("k", "D", 1.0);
        drop(cache);

        let reopened = DiagnosisCache::open(&path).unwrap_or_else(|_| unreachable!());
        assert_eq!(reopened.stats().total_cached, 1);
    }

    #[test]
    fn test_open_reports_unwritable_parent() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap_or_else(|_| unreachable!());

        let result = DiagnosisCache::open(&blocker.join("cache.db"));
        assert!(matches!(result, Err(CacheError::CreateDir { .. })));
    }
}
