//! Client for the item exchange price API.
//!
//! Covers the price host (latest quotes, item catalog, timeseries, period
//! aggregates) and the separate volumes host. All payloads flow through the
//! shared [`Fetcher`], so caching, deduplication, rate limiting and stale
//! fallback behave identically across endpoints.

pub mod types;

use futures::future::join_all;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use self::types::{
    parse_catalog, parse_latest, parse_period, parse_timeseries, volume_from_value, CatalogItem,
    ItemOverview, PeriodStats, PricePoint, PriceQuote, Timestep, VolumePoint,
};
use super::client::{HttpClient, HttpTransport};
use super::fetcher::{ttl_table, Fetcher};
use crate::cache::CacheStats;
use crate::config::{BatchConfig, ExchangeConfig};
use crate::errors::{FetchError, FetchResult, UnavailableKind};

/// Built-in TTLs per cache category, in seconds.
static DEFAULT_TTLS: Lazy<HashMap<&'static str, u64>> = Lazy::new(|| {
    HashMap::from([
        ("latest", 60),
        ("mapping", 3600),
        ("5m", 60),
        ("1h", 300),
        ("6h", 600),
        ("24h", 1800),
        ("timeseries", 60),
        ("volumes", 60),
    ])
});

/// Names per volumes request. The volumes host rejects much longer queries.
const VOLUME_CHUNK_SIZE: usize = 100;

pub struct ExchangeClient {
    fetcher: Fetcher,
    enabled: bool,
    base_url: String,
    volumes_url: String,
    batch: BatchConfig,
}

impl ExchangeClient {
    pub fn new(config: &ExchangeConfig, batch: &BatchConfig) -> FetchResult<Self> {
        let transport = HttpClient::new(config.timeout_seconds, &config.user_agent, None)?;
        Ok(Self::with_transport(Arc::new(transport), config, batch))
    }

    /// Build against any transport. Tests inject a scripted one.
    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        config: &ExchangeConfig,
        batch: &BatchConfig,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(
                "exchange",
                transport,
                &config.rate_limit,
                ttl_table(&DEFAULT_TTLS, &config.ttl_overrides),
                Duration::from_secs(config.default_ttl_seconds),
            ),
            enabled: config.enabled,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            volumes_url: config.volumes_url.clone(),
            batch: batch.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn ensure_enabled(&self) -> FetchResult<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(FetchError::Disabled("exchange".to_string()))
        }
    }

    /// Latest instantaneous quotes.
    ///
    /// # Arguments
    /// * `item_ids` - Restrict the answer to these items; `None` fetches the
    ///   full listing. Each distinct id set is cached separately.
    /// * `force_refresh` - Bypass the cache and refetch
    pub async fn latest_prices(
        &self,
        item_ids: Option<&[i64]>,
        force_refresh: bool,
    ) -> FetchResult<HashMap<i64, PriceQuote>> {
        self.ensure_enabled()?;
        let (key, url) = match item_ids {
            Some(ids) if !ids.is_empty() => {
                let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
                (
                    format!("latest_{joined}"),
                    format!("{}/latest?id={joined}", self.base_url),
                )
            }
            _ => ("latest_all".to_string(), format!("{}/latest", self.base_url)),
        };
        let payload = self
            .fetcher
            .fetch_json(&key, "latest", &url, force_refresh)
            .await?;
        parse_latest(payload)
    }

    /// The full tradeable-item listing. Feeds the catalog index.
    pub async fn item_catalog(&self, force_refresh: bool) -> FetchResult<Vec<CatalogItem>> {
        self.ensure_enabled()?;
        let url = format!("{}/mapping", self.base_url);
        let payload = self
            .fetcher
            .fetch_json("mapping", "mapping", &url, force_refresh)
            .await?;
        parse_catalog(payload)
    }

    /// Price history for one item. Cached under the step's own TTL, so 5m
    /// data turns over quickly while daily data lingers.
    pub async fn timeseries(
        &self,
        item_id: i64,
        step: Timestep,
        force_refresh: bool,
    ) -> FetchResult<Vec<PricePoint>> {
        self.ensure_enabled()?;
        let key = format!("timeseries_{item_id}_{step}");
        let url = format!("{}/timeseries?timestep={step}&id={item_id}", self.base_url);
        let payload = self
            .fetcher
            .fetch_json(&key, step.as_str(), &url, force_refresh)
            .await?;
        parse_timeseries(payload)
    }

    /// Aggregated prices and volumes across all items for one trailing window.
    pub async fn period_prices(
        &self,
        step: Timestep,
        force_refresh: bool,
    ) -> FetchResult<HashMap<i64, PeriodStats>> {
        self.ensure_enabled()?;
        let key = format!("period_{step}");
        let url = format!("{}/{step}", self.base_url);
        let payload = self
            .fetcher
            .fetch_json(&key, step.as_str(), &url, force_refresh)
            .await?;
        parse_period(payload)
    }

    /// Daily traded volumes for the given item names.
    ///
    /// The volumes host answers a limited number of names per request, so
    /// names are chunked, the chunks fetched in concurrent waves of the
    /// configured batch size, and the answers merged into one cached
    /// document. A failed chunk is logged and skipped; the call errors only
    /// when every chunk fails, in which case a stale merged document is
    /// served if one exists.
    ///
    /// # Returns
    /// Volumes for the requested names that the provider knows about.
    /// Unknown names are absent rather than an error.
    pub async fn trade_volumes(
        &self,
        names: &[String],
        force_refresh: bool,
    ) -> FetchResult<HashMap<String, VolumePoint>> {
        self.ensure_enabled()?;
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let merged = self
            .fetcher
            .fetch_json_via(
                "volumes_all",
                "volumes",
                force_refresh,
                self.fetch_volume_chunks(names),
            )
            .await?;

        let Value::Object(map) = merged else {
            return Err(FetchError::invalid(
                "volumes_all",
                "merged payload is not an object",
            ));
        };
        let mut volumes = HashMap::new();
        for name in names {
            if let Some(point) = map.get(name).and_then(volume_from_value) {
                volumes.insert(name.clone(), point);
            }
        }
        Ok(volumes)
    }

    /// Fan out the chunked volume requests and merge the answers into one
    /// JSON object. Runs under the `volumes_all` cache lock.
    async fn fetch_volume_chunks(&self, names: &[String]) -> FetchResult<Value> {
        let chunk_urls = names
            .chunks(VOLUME_CHUNK_SIZE)
            .map(|chunk| {
                Url::parse_with_params(&self.volumes_url, [("name", chunk.join("|"))])
                    .map(String::from)
                    .map_err(|e| FetchError::Internal(format!("bad volumes url: {e}")))
            })
            .collect::<FetchResult<Vec<_>>>()?;

        let total = chunk_urls.len();
        let mut merged = serde_json::Map::new();
        let mut fetched = 0usize;

        for wave in chunk_urls.chunks(self.batch.batch_size.max(1)) {
            let results = join_all(wave.iter().map(|url| self.fetcher.fetch_direct(url))).await;
            for (url, result) in wave.iter().zip(results) {
                match result {
                    Ok(Value::Object(chunk)) => {
                        fetched += 1;
                        merged.extend(chunk);
                    }
                    Ok(_) => {
                        log::warn!("exchange: volume chunk returned a non-object payload ({url})");
                    }
                    Err(err) => {
                        log::warn!("exchange: volume chunk failed, skipping ({url}): {err}");
                    }
                }
            }
        }

        if fetched == 0 {
            return Err(FetchError::unavailable(
                UnavailableKind::Server,
                format!("all {total} volume chunks failed"),
            ));
        }
        if fetched < total {
            log::warn!("exchange: merged volumes from {fetched}/{total} chunks");
        }
        Ok(Value::Object(merged))
    }

    /// Everything known about one item in one call: catalog metadata, the
    /// latest quote and all four history resolutions, fetched concurrently.
    /// A failed section is logged and left empty so one flaky endpoint does
    /// not sink the whole overview.
    pub async fn item_overview(
        &self,
        item_id: i64,
        force_refresh: bool,
    ) -> FetchResult<ItemOverview> {
        self.ensure_enabled()?;

        let ids = [item_id];
        let (catalog, latest, series) = tokio::join!(
            self.item_catalog(false),
            self.latest_prices(Some(&ids), force_refresh),
            join_all(Timestep::ALL.into_iter().map(|step| async move {
                (step, self.timeseries(item_id, step, force_refresh).await)
            })),
        );

        let mut overview = ItemOverview::default();

        match catalog {
            Ok(items) => overview.item = items.into_iter().find(|item| item.id == item_id),
            Err(err) => log::warn!("exchange: overview catalog lookup failed for {item_id}: {err}"),
        }
        match latest {
            Ok(quotes) => overview.latest = quotes.get(&item_id).copied(),
            Err(err) => log::warn!("exchange: overview latest quote failed for {item_id}: {err}"),
        }
        for (step, result) in series {
            match result {
                Ok(points) => {
                    overview.history.insert(step.to_string(), points);
                }
                Err(err) => {
                    log::warn!("exchange: overview {step} history failed for {item_id}: {err}")
                }
            }
        }

        Ok(overview)
    }

    // ===== Cache and stats passthroughs =====

    pub async fn stats(&self) -> CacheStats {
        self.fetcher.stats().await
    }

    pub fn reset_stats(&self) {
        self.fetcher.reset_stats();
    }

    pub fn clear_cache(&self) -> usize {
        let removed = self.fetcher.cache().clear();
        log::info!("exchange: cleared {removed} cached entries");
        removed
    }

    /// Drop cached entries whose key starts with `prefix`.
    pub fn clear_prefix(&self, prefix: &str) -> usize {
        self.fetcher.cache().clear_prefix(prefix)
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .finish()
    }
}
