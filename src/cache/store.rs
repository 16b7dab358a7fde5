//! TTL-aware key/value store for provider payloads.
//!
//! Entries are JSON payloads tagged with a category. Each category maps to a
//! TTL fixed at construction; freshness is computed on every read and nothing
//! is ever evicted, so stale entries remain available as a fallback during
//! provider outages. Key layout is flat (`latest_all`, `rating_na_some_tag`,
//! `timeseries_4151_1h`, ...), which makes prefix clears and substring
//! invalidation cheap enough at this scale.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// One cached payload.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Value,
    /// Category the entry was stored under. Never changes for the lifetime
    /// of the key.
    pub category: String,
    /// Monotonic store time, used for freshness checks.
    pub fetched_at: Instant,
    /// Wall-clock store time, for display and debugging.
    pub fetched_at_utc: DateTime<Utc>,
}

/// Category-keyed TTL cache.
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttls: HashMap<String, Duration>,
    default_ttl: Duration,
}

impl TtlCache {
    pub fn new(ttls: HashMap<String, Duration>, default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttls,
            default_ttl,
        }
    }

    /// TTL for a category, falling back to the default for unknown ones.
    pub fn ttl_for(&self, category: &str) -> Duration {
        self.ttls.get(category).copied().unwrap_or(self.default_ttl)
    }

    /// Whether `key` holds an entry younger than the category's TTL.
    pub fn is_fresh(&self, key: &str, category: &str) -> bool {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) => entry.fetched_at.elapsed() < self.ttl_for(category),
            None => false,
        }
    }

    /// Payload for `key` if present and fresh.
    pub fn get_fresh(&self, key: &str, category: &str) -> Option<Value> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.fetched_at.elapsed() < self.ttl_for(category) {
            Some(entry.payload.clone())
        } else {
            None
        }
    }

    /// Payload for `key` regardless of age. Used for stale fallback.
    pub fn get_any(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).map(|e| e.payload.clone())
    }

    /// Age of the entry under `key`, if any.
    pub fn age(&self, key: &str) -> Option<Duration> {
        self.entries.read().get(key).map(|e| e.fetched_at.elapsed())
    }

    /// Store `payload` under `key`. Overwrites any previous entry and resets
    /// its age.
    pub fn put(&self, key: &str, category: &str, payload: Value) {
        let entry = CacheEntry {
            payload,
            category: category.to_string(),
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Drop entries whose key starts with `prefix`. Returns how many were
    /// removed.
    pub fn clear_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Drop entries whose key contains `fragment`. Returns how many were
    /// removed.
    pub fn invalidate_matching(&self, fragment: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.contains(fragment));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entry count per category, sorted for stable output.
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let entries = self.entries.read();
        let mut counts = BTreeMap::new();
        for entry in entries.values() {
            *counts.entry(entry.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// `(fresh, stale)` entry counts, judged against each entry's own
    /// category TTL.
    pub fn freshness_counts(&self) -> (usize, usize) {
        let entries = self.entries.read();
        let mut fresh = 0;
        let mut stale = 0;
        for entry in entries.values() {
            if entry.fetched_at.elapsed() < self.ttl_for(&entry.category) {
                fresh += 1;
            } else {
                stale += 1;
            }
        }
        (fresh, stale)
    }
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.len())
            .field("categories", &self.ttls.len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
