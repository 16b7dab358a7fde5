//! Per-key async locks for fetch deduplication.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Hands out one async mutex per cache key.
///
/// Concurrent callers asking for the same key always receive the same mutex
/// instance, including on first use; the registry map is guarded so racing
/// creations cannot mint two locks for one key. Locks are kept for the
/// lifetime of the registry, matching the cache's own unbounded key space.
#[derive(Default)]
pub struct KeyLockRegistry {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock guarding fetches for `key`, created on first use.
    pub fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Number of keys that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

impl std::fmt::Debug for KeyLockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLockRegistry")
            .field("keys", &self.len())
            .finish()
    }
}
