//! In-memory search index over the item catalog.
//!
//! Built once from the catalog listing and republished atomically on
//! refresh: readers clone an `Arc` snapshot and never observe a half-built
//! index. Search layers cheap strategies (exact, prefix buckets, word
//! buckets) and falls back to a bounded linear scan only while results are
//! scarce, so worst-case queries stay predictable on a five-figure catalog.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::apis::exchange::types::CatalogItem;

/// Results returned when the caller does not say how many they want.
pub const DEFAULT_SEARCH_LIMIT: usize = 25;

/// Prefix buckets are keyed by the first characters of a name, up to this
/// many.
const PREFIX_KEY_CHARS: usize = 3;
const PREFIX_BUCKET_CAP: usize = 200;
const WORD_BUCKET_CAP: usize = 100;

#[derive(Default)]
struct IndexSnapshot {
    /// Catalog order, as the provider listed it.
    items: Vec<CatalogItem>,
    /// Lowercased names, parallel to `items`.
    lower: Vec<String>,
    by_id: HashMap<i64, usize>,
    exact: HashMap<String, usize>,
    prefix: HashMap<String, Vec<usize>>,
    words: HashMap<String, Vec<usize>>,
}

impl IndexSnapshot {
    fn build(items: Vec<CatalogItem>) -> Self {
        let lower: Vec<String> = items.iter().map(|item| item.name.to_lowercase()).collect();
        let mut by_id = HashMap::with_capacity(items.len());
        let mut exact = HashMap::with_capacity(items.len());
        let mut prefix: HashMap<String, Vec<usize>> = HashMap::new();
        let mut words: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, name) in lower.iter().enumerate() {
            by_id.insert(items[idx].id, idx);
            exact.insert(name.clone(), idx);

            let mut key = String::new();
            for ch in name.chars().take(PREFIX_KEY_CHARS) {
                key.push(ch);
                let bucket = prefix.entry(key.clone()).or_default();
                if bucket.len() < PREFIX_BUCKET_CAP {
                    bucket.push(idx);
                }
            }

            for word in name.split_whitespace() {
                if word.chars().count() >= 2 {
                    let bucket = words.entry(word.to_string()).or_default();
                    if bucket.len() < WORD_BUCKET_CAP {
                        bucket.push(idx);
                    }
                }
            }
        }

        Self {
            items,
            lower,
            by_id,
            exact,
            prefix,
            words,
        }
    }
}

pub struct CatalogIndex {
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
        }
    }

    /// Replace the whole index. The new snapshot is built aside and swapped
    /// in with one write, so concurrent readers see either the old catalog
    /// or the new one in full.
    pub fn rebuild(&self, items: Vec<CatalogItem>) {
        let snapshot = Arc::new(IndexSnapshot::build(items));
        let count = snapshot.items.len();
        *self.snapshot.write() = snapshot;
        log::info!("catalog index rebuilt with {count} items");
    }

    /// Ranked name search.
    ///
    /// Strategies run in order, each feeding a shared candidate list that is
    /// deduplicated by lowercased name: exact name, the prefix bucket for
    /// the query's first characters, word buckets for each query token, and
    /// finally a linear scan. Later strategies run only while fewer than
    /// `limit` candidates exist, and gathering stops at twice the limit so
    /// ranking has some slack without scanning everything. Candidates are
    /// sorted exact-first, then prefix matches, then alphabetically.
    pub fn search(&self, query: &str, limit: usize) -> Vec<CatalogItem> {
        let snapshot = self.snapshot.read().clone();
        let query = query.trim().to_lowercase();

        if query.is_empty() {
            return snapshot.items.iter().take(limit).cloned().collect();
        }

        let target = limit.saturating_mul(2);
        let mut matches: Vec<usize> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        if let Some(&idx) = snapshot.exact.get(&query) {
            seen.insert(snapshot.lower[idx].as_str());
            matches.push(idx);
        }

        let prefix_key: String = query.chars().take(PREFIX_KEY_CHARS).collect();
        if let Some(bucket) = snapshot.prefix.get(&prefix_key) {
            for &idx in bucket {
                if matches.len() >= target {
                    break;
                }
                let name = snapshot.lower[idx].as_str();
                if name.contains(&query) && seen.insert(name) {
                    matches.push(idx);
                }
            }
        }

        if matches.len() < limit {
            for word in query.split_whitespace() {
                if word.chars().count() < 2 {
                    continue;
                }
                if let Some(bucket) = snapshot.words.get(word) {
                    for &idx in bucket {
                        if matches.len() >= target {
                            break;
                        }
                        let name = snapshot.lower[idx].as_str();
                        if name.contains(&query) && seen.insert(name) {
                            matches.push(idx);
                        }
                    }
                }
            }
        }

        // Catch-all for matches the buckets cannot reach, bounded by the
        // same candidate target.
        if matches.len() < limit {
            for (idx, name) in snapshot.lower.iter().enumerate() {
                if matches.len() >= target {
                    break;
                }
                if name.contains(&query) && seen.insert(name.as_str()) {
                    matches.push(idx);
                }
            }
        }

        matches.sort_by(|&a, &b| {
            let (na, nb) = (snapshot.lower[a].as_str(), snapshot.lower[b].as_str());
            (na != query, !na.starts_with(&query))
                .cmp(&(nb != query, !nb.starts_with(&query)))
                .then_with(|| na.cmp(nb))
        });
        matches.truncate(limit);
        matches
            .into_iter()
            .map(|idx| snapshot.items[idx].clone())
            .collect()
    }

    /// Exact lookup by name, case-insensitive.
    pub fn lookup_name(&self, name: &str) -> Option<CatalogItem> {
        let snapshot = self.snapshot.read().clone();
        let idx = *snapshot.exact.get(&name.trim().to_lowercase())?;
        Some(snapshot.items[idx].clone())
    }

    pub fn get(&self, id: i64) -> Option<CatalogItem> {
        let snapshot = self.snapshot.read().clone();
        let idx = *snapshot.by_id.get(&id)?;
        Some(snapshot.items[idx].clone())
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CatalogIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CatalogIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogIndex")
            .field("items", &self.len())
            .finish()
    }
}
