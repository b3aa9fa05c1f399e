//! Cache Statistics Module
//!
//! Per-instance hit/miss counters and the report returned by `get_stats`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Hit Counters ==
/// In-process hit/miss counters. Reset on restart and never shared between
/// instances.
#[derive(Debug, Default)]
pub struct HitCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HitCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Current (hits, misses).
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

// == Key Hits ==
/// Hit count of a single cached key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyHits {
    pub key: String,
    pub hits: u64,
}

// == Cache Stats ==
/// Cache performance report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful reads on this instance
    pub hits: u64,
    /// Number of reads that found nothing usable on this instance
    pub misses: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    /// Keys in the backing database, all record kinds included
    pub total_keys: u64,
    /// Most-hit keys among a bounded sample of metadata records
    pub top_keys: Vec<KeyHits>,
    /// Backend the cache runs on
    pub backend: String,
}

impl CacheStats {
    // == Constructor ==
    /// Builds a report from counter values; the hit rate is derived.
    pub fn new(hits: u64, misses: u64) -> Self {
        Self {
            hits,
            misses,
            hit_rate: hit_rate(hits, misses),
            ..Self::default()
        }
    }
}

// == Hit Rate ==
/// Returns hits / (hits + misses), or 0.0 if no requests have been made.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
