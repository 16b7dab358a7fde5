//! Fetch and cache-effectiveness counters.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::store::TtlCache;

/// Lock-free counters recorded by the fetch path.
#[derive(Debug, Default)]
pub struct StatsTracker {
    hits: AtomicU64,
    misses: AtomicU64,
    api_calls: AtomicU64,
    rate_limit_hits: AtomicU64,
    errors: AtomicU64,
    stale_serves: AtomicU64,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// One upstream HTTP response received, whatever its status.
    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_serve(&self) {
        self.stale_serves.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter. Cached entries are untouched.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.api_calls.store(0, Ordering::Relaxed);
        self.rate_limit_hits.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.stale_serves.store(0, Ordering::Relaxed);
    }

    /// Snapshot counters together with the cache's current shape.
    pub fn snapshot(&self, cache: &TtlCache, requests_in_window: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let hit_rate_percent = if lookups == 0 {
            0.0
        } else {
            (hits as f64 / lookups as f64) * 100.0
        };
        let (fresh_entries, stale_entries) = cache.freshness_counts();

        CacheStats {
            hits,
            misses,
            api_calls: self.api_calls.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            hit_rate_percent,
            cached_entries: cache.len(),
            fresh_entries,
            stale_entries,
            entries_by_category: cache.category_counts(),
            requests_in_window,
        }
    }
}

/// Point-in-time view of one client's cache behaviour.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub api_calls: u64,
    pub rate_limit_hits: u64,
    pub errors: u64,
    pub stale_serves: u64,
    /// hits / (hits + misses) * 100, 0 when no lookups happened yet.
    pub hit_rate_percent: f64,
    pub cached_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
    pub entries_by_category: BTreeMap<String, usize>,
    /// Requests admitted in the current rate-limit window.
    pub requests_in_window: usize,
}
