//! In-memory TTL cache, per-key fetch locks and hit/miss accounting.
//!
//! The cache never expires entries on its own. Staleness is checked lazily on
//! read, which keeps stale payloads around for the fetch layer's
//! outage fallback.

pub mod keylock;
pub mod stats;
pub mod store;

pub use keylock::KeyLockRegistry;
pub use stats::{CacheStats, StatsTracker};
pub use store::{CacheEntry, TtlCache};
