//! Cache-aware fetch engine shared by every provider client.
//!
//! One `Fetcher` owns the full request path for one provider: TTL cache,
//! per-key locks, sliding-window rate limiter and counters. Provider clients
//! only decide keys, categories and URLs.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::client::{HttpTransport, RateLimiter, RawResponse, ResponseClass};
use crate::cache::{CacheStats, KeyLockRegistry, StatsTracker, TtlCache};
use crate::config::RateLimitConfig;
use crate::errors::{FetchError, FetchResult, UnavailableKind};

/// Merge a client's built-in category TTLs with config overrides.
pub(crate) fn ttl_table(
    defaults: &HashMap<&'static str, u64>,
    overrides: &HashMap<String, u64>,
) -> HashMap<String, Duration> {
    let mut table: HashMap<String, Duration> = defaults
        .iter()
        .map(|(category, secs)| (category.to_string(), Duration::from_secs(*secs)))
        .collect();
    for (category, secs) in overrides {
        table.insert(category.clone(), Duration::from_secs(*secs));
    }
    table
}

pub struct Fetcher {
    provider: &'static str,
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    cache: TtlCache,
    locks: KeyLockRegistry,
    stats: StatsTracker,
}

impl Fetcher {
    pub fn new(
        provider: &'static str,
        transport: Arc<dyn HttpTransport>,
        rate: &RateLimitConfig,
        ttls: HashMap<String, Duration>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            transport,
            limiter: RateLimiter::new(rate),
            cache: TtlCache::new(ttls, default_ttl),
            locks: KeyLockRegistry::new(),
            stats: StatsTracker::new(),
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    pub fn stats_tracker(&self) -> &StatsTracker {
        &self.stats
    }

    /// Counters plus the current cache and rate-window shape.
    pub async fn stats(&self) -> CacheStats {
        self.stats
            .snapshot(&self.cache, self.limiter.in_window().await)
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Fetch one JSON document with caching, deduplication and rate limiting.
    ///
    /// The path for a cache miss: take the key's lock, re-check the cache
    /// (another task may have refreshed it while we waited), wait for rate
    /// window room and a concurrency permit, perform the GET, classify the
    /// response and cache the payload on success. If the provider is
    /// unavailable and a stale entry exists, the stale entry is returned
    /// instead of the error. `NotFound` and `RateLimited` always surface,
    /// and nothing is cached for them.
    ///
    /// # Arguments
    /// * `key` - Unique cache key for this document
    /// * `category` - TTL category the key belongs to
    /// * `url` - Endpoint to GET on a miss
    /// * `force_refresh` - Skip freshness checks and always hit the network
    pub async fn fetch_json(
        &self,
        key: &str,
        category: &str,
        url: &str,
        force_refresh: bool,
    ) -> FetchResult<Value> {
        self.fetch_json_via(key, category, force_refresh, self.request(key, url))
            .await
    }

    /// Run the cache protocol around an arbitrary loader instead of a single
    /// GET. Used for fan-out fetches that produce one merged payload.
    pub async fn fetch_json_via<Fut>(
        &self,
        key: &str,
        category: &str,
        force_refresh: bool,
        loader: Fut,
    ) -> FetchResult<Value>
    where
        Fut: Future<Output = FetchResult<Value>>,
    {
        if !force_refresh {
            if let Some(value) = self.cache.get_fresh(key, category) {
                self.stats.record_hit();
                log::debug!("{}: cache hit for {}", self.provider, key);
                return Ok(value);
            }
        }
        self.stats.record_miss();

        let lock = self.locks.lock_for(key);
        let _guard = lock.lock().await;

        if !force_refresh {
            if let Some(value) = self.cache.get_fresh(key, category) {
                log::debug!("{}: {} was refreshed while waiting for its lock", self.provider, key);
                return Ok(value);
            }
        }

        match loader.await {
            Ok(payload) => {
                self.cache.put(key, category, payload.clone());
                log::debug!("{}: fetched {}", self.provider, key);
                Ok(payload)
            }
            Err(err) if err.allows_stale_fallback() => self.stale_fallback(key, err),
            Err(err) => Err(err),
        }
    }

    /// One rate-limited, classified request with no cache involvement.
    /// Callers that merge several requests into one cache entry use this for
    /// the individual legs.
    pub async fn fetch_direct(&self, url: &str) -> FetchResult<Value> {
        self.request(url, url).await
    }

    /// Admit one request through the limiter, perform it and interpret the
    /// outcome. `label` names the request in errors and logs.
    async fn request(&self, label: &str, url: &str) -> FetchResult<Value> {
        let result = {
            let _slot = self.limiter.acquire().await?;
            self.transport.get(url).await
            // Concurrency permit released here, success or failure.
        };

        match result {
            Ok(response) => {
                self.stats.record_api_call();
                self.interpret(label, response)
            }
            Err(err) => {
                self.stats.record_error();
                log::warn!("{}: request for {} failed: {}", self.provider, label, err);
                Err(err)
            }
        }
    }

    /// Turn a raw response into a payload or a classified error.
    fn interpret(&self, label: &str, response: RawResponse) -> FetchResult<Value> {
        match response.classify() {
            ResponseClass::Success => match serde_json::from_str::<Value>(&response.body) {
                Ok(payload) => Ok(payload),
                Err(err) => {
                    self.stats.record_error();
                    log::warn!("{}: unparseable payload for {}: {}", self.provider, label, err);
                    Err(FetchError::invalid(
                        label,
                        format!("body is not valid JSON: {err}"),
                    ))
                }
            },
            ResponseClass::NotFound => {
                log::debug!("{}: {} not found upstream", self.provider, label);
                Err(FetchError::not_found(label))
            }
            ResponseClass::RateLimited { retry_after_secs } => {
                self.stats.record_rate_limit_hit();
                log::warn!(
                    "{}: rate limited on {}, retry after {}s",
                    self.provider,
                    label,
                    retry_after_secs
                );
                Err(FetchError::RateLimited { retry_after_secs })
            }
            ResponseClass::Unavailable => {
                self.stats.record_error();
                log::warn!(
                    "{}: {} unavailable (status {})",
                    self.provider,
                    label,
                    response.status
                );
                Err(FetchError::unavailable(
                    UnavailableKind::Server,
                    format!("unexpected status {}", response.status),
                ))
            }
        }
    }

    /// Serve the cached entry regardless of age, or surface `err`.
    fn stale_fallback(&self, key: &str, err: FetchError) -> FetchResult<Value> {
        match self.cache.get_any(key) {
            Some(stale) => {
                self.stats.record_stale_serve();
                let age = self.cache.age(key).unwrap_or_default();
                log::warn!(
                    "{}: serving stale {} ({}s old) after error: {}",
                    self.provider,
                    key,
                    age.as_secs(),
                    err
                );
                Ok(stale)
            }
            None => Err(err),
        }
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("provider", &self.provider)
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::testing::{MockTransport, Scripted};
    use futures::future::join_all;
    use serde_json::json;

    const URL: &str = "http://exchange.test/latest";

    fn fetcher(transport: Arc<MockTransport>) -> Fetcher {
        let rate = RateLimitConfig {
            max_requests_per_window: 100,
            window_seconds: 60,
            max_concurrent: 5,
        };
        let mut ttls = HashMap::new();
        ttls.insert("latest".to_string(), Duration::from_secs(300));
        Fetcher::new("test", transport, &rate, ttls, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_hit_skips_network() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::ok("{\"v\":1}"));
        let fetcher = fetcher(transport.clone());

        let first = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        let second = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();

        assert_eq!(first, json!({"v": 1}));
        assert_eq!(second, json!({"v": 1}));
        assert_eq!(transport.calls(), 1);

        let stats = fetcher.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.api_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_refetch() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::ok("{\"v\":1}"));
        transport.script(URL, Scripted::ok("{\"v\":2}"));
        let fetcher = fetcher(transport.clone());

        let first = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        assert_eq!(first, json!({"v": 1}));

        // Within TTL nothing new is fetched.
        tokio::time::advance(Duration::from_secs(100)).await;
        fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        assert_eq!(transport.calls(), 1);

        // Past TTL the next read refetches and the payload is replaced.
        tokio::time::advance(Duration::from_secs(300)).await;
        let third = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        assert_eq!(third, json!({"v": 2}));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_bypasses_fresh_entry() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::ok("{\"v\":1}"));
        transport.script(URL, Scripted::ok("{\"v\":2}"));
        let fetcher = fetcher(transport.clone());

        fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        let refreshed = fetcher.fetch_json("latest_all", "latest", URL, true).await.unwrap();

        assert_eq!(refreshed, json!({"v": 2}));
        assert_eq!(transport.calls(), 2);
        // The refreshed payload replaced the cached one.
        assert_eq!(
            fetcher.cache().get_fresh("latest_all", "latest"),
            Some(json!({"v": 2}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_fetch() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::ok("{\"v\":1}"));
        transport.set_delay(Duration::from_millis(50));
        let fetcher = fetcher(transport.clone());

        let fetches = (0..8).map(|_| fetcher.fetch_json("latest_all", "latest", URL, false));
        let results = join_all(fetches).await;

        for result in results {
            assert_eq!(result.unwrap(), json!({"v": 1}));
        }
        assert_eq!(transport.calls(), 1);

        let stats = fetcher.stats().await;
        assert_eq!(stats.api_calls, 1);
        assert_eq!(stats.misses, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entry_served_when_provider_unavailable() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::ok("{\"v\":1}"));
        transport.script(URL, Scripted::server_error());
        let fetcher = fetcher(transport.clone());

        fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        tokio::time::advance(Duration::from_secs(400)).await;

        let stale = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        assert_eq!(stale, json!({"v": 1}));
        assert_eq!(transport.calls(), 2);

        let stats = fetcher.stats().await;
        assert_eq!(stats.stale_serves, 1);
        assert_eq!(stats.errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_also_falls_back_to_stale() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::ok("{\"v\":1}"));
        transport.script(URL, Scripted::Timeout);
        let fetcher = fetcher(transport.clone());

        fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        tokio::time::advance(Duration::from_secs(400)).await;

        let stale = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        assert_eq!(stale, json!({"v": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_without_cache_surfaces_error() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::server_error());
        let fetcher = fetcher(transport.clone());

        let err = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { .. }));
        assert!(fetcher.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_is_never_replaced_by_stale() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::ok("{\"v\":1}"));
        transport.script(URL, Scripted::rate_limited(Some(30)));
        let fetcher = fetcher(transport.clone());

        fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        tokio::time::advance(Duration::from_secs(400)).await;

        let err = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(30));

        let stats = fetcher.stats().await;
        assert_eq!(stats.rate_limit_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_surfaces_despite_stale_entry() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::ok("{\"v\":1}"));
        transport.script(URL, Scripted::not_found());
        let fetcher = fetcher(transport.clone());

        fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        tokio::time::advance(Duration::from_secs(400)).await;

        let err = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_json_is_surfaced_and_never_cached() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::ok("<html>maintenance</html>"));
        transport.script(URL, Scripted::ok("{\"v\":2}"));
        let fetcher = fetcher(transport.clone());

        let err = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponse { .. }));
        assert!(fetcher.cache().is_empty());

        // The bad body was not cached, so the next call goes back out.
        let second = fetcher.fetch_json("latest_all", "latest", URL, false).await.unwrap();
        assert_eq!(second, json!({"v": 2}));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_direct_never_caches() {
        let transport = Arc::new(MockTransport::new());
        transport.script(URL, Scripted::ok("{\"v\":1}"));
        let fetcher = fetcher(transport.clone());

        fetcher.fetch_direct(URL).await.unwrap();
        fetcher.fetch_direct(URL).await.unwrap();

        assert_eq!(transport.calls(), 2);
        assert!(fetcher.cache().is_empty());
    }
}
