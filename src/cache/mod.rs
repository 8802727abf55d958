//! Content-hash keyed cache of final diagnoses.
//!
//! The cache is strictly an optimisation: every public operation logs and
//! swallows storage errors so a broken cache never breaks a diagnosis.

mod sqlite;

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use sha2::{Digest, Sha256};

pub use sqlite::DiagnosisCache;

/// Source of the current time in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    }
}

/// Manually advanced clock for tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub const fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Sets the clock.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Cache key for a report.
///
/// SHA-256 (hex) of the report with runs of whitespace collapsed to one
/// space, trimmed and lower-cased, so trivially reformatted duplicates
/// share a key.
#[must_use]
pub fn cache_key(report: &str) -> String {
    let normalized = report
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// One cached diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    /// Content hash.
    pub key: String,
    /// Final diagnosis text.
    pub diagnosis: String,
    /// Fraction of assigned specialists that completed.
    pub confidence: f64,
    /// Insertion time (epoch seconds).
    pub created_at: i64,
    /// Number of successful reads, including this one.
    pub hit_count: u64,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Rows in the cache.
    pub total_cached: u64,
    /// Sum of hit counts.
    pub total_hits: u64,
    /// Mean hit count, rounded to two decimals.
    pub average_hits: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_normalises_whitespace_and_case() {
        assert_eq!(cache_key("Chest  pain\n\tTwo days "), cache_key("chest pain two days"));
        assert_ne!(cache_key("chest pain"), cache_key("chest pains"));
        assert_eq!(cache_key("x").len(), 64);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        clock.advance(50);
        assert_eq!(clock.now(), 150);
        clock.set(7);
        assert_eq!(clock.now(), 7);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
