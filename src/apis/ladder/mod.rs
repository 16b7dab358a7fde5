//! Client for the competitive ladder API.
//!
//! Player-centric endpoints (rating, histories, stored matches) plus match
//! detail lookups. Player name and tag travel as URL path segments, so URLs
//! are built through [`url::Url`] to keep arbitrary player names safely
//! encoded.

pub mod types;

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use self::types::{PlayerKey, PlayerRating};
use super::batch::BatchRequest;
use super::client::{HttpClient, HttpTransport};
use super::fetcher::{ttl_table, Fetcher};
use crate::cache::CacheStats;
use crate::config::{BatchConfig, LadderConfig};
use crate::errors::{FetchError, FetchResult};

/// Built-in TTLs per cache category, in seconds. Live standings turn over
/// quickly; finished matches never change, so they linger.
static DEFAULT_TTLS: Lazy<HashMap<&'static str, u64>> = Lazy::new(|| {
    HashMap::from([
        ("rating", 300),
        ("rating_history", 300),
        ("stored_history", 600),
        ("matches", 600),
        ("match", 3600),
    ])
});

const USER_AGENT: &str = concat!("lootdex/", env!("CARGO_PKG_VERSION"));

/// Outcome of a batch rating run. Partial on abort: players processed
/// before the rate limit keep their entries, the rest are absent.
#[derive(Debug, Default)]
pub struct BatchRatings {
    pub ratings: BTreeMap<PlayerKey, FetchResult<PlayerRating>>,
    pub aborted: Option<FetchError>,
}

impl BatchRatings {
    pub fn is_rate_limited(&self) -> bool {
        self.aborted
            .as_ref()
            .map(FetchError::is_rate_limited)
            .unwrap_or(false)
    }
}

pub struct LadderClient {
    fetcher: Fetcher,
    enabled: bool,
    base_url: String,
    default_region: String,
    batch: BatchConfig,
}

impl LadderClient {
    pub fn new(config: &LadderConfig, batch: &BatchConfig) -> FetchResult<Self> {
        let api_key = (!config.api_key.is_empty()).then(|| config.api_key.clone());
        let transport = HttpClient::new(config.timeout_seconds, USER_AGENT, api_key)?;
        Ok(Self::with_transport(Arc::new(transport), config, batch))
    }

    /// Build against any transport. Tests inject a scripted one.
    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        config: &LadderConfig,
        batch: &BatchConfig,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(
                "ladder",
                transport,
                &config.rate_limit,
                ttl_table(&DEFAULT_TTLS, &config.ttl_overrides),
                Duration::from_secs(config.default_ttl_seconds),
            ),
            enabled: config.enabled,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_region: config.default_region.clone(),
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
            Err(FetchError::Disabled("ladder".to_string()))
        }
    }

    fn region<'a>(&'a self, region: Option<&'a str>) -> &'a str {
        region.unwrap_or(&self.default_region)
    }

    /// URL under the base with percent-encoded path segments.
    fn url_with_segments(&self, segments: &[&str]) -> FetchResult<String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| FetchError::Internal(format!("bad ladder base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Internal("ladder base url cannot hold paths".to_string()))?
            .extend(segments);
        Ok(url.into())
    }

    fn rating_request(&self, player: &PlayerKey, region: &str) -> FetchResult<BatchRequest> {
        Ok(BatchRequest {
            key: format!("rating_{region}_{}", player.cache_fragment()),
            category: "rating".to_string(),
            url: self.url_with_segments(&[
                "v3",
                "mmr",
                region,
                "pc",
                player.name(),
                player.tag(),
            ])?,
        })
    }

    /// Current competitive standing for one player.
    ///
    /// # Arguments
    /// * `player` - Normalized name and tag
    /// * `region` - Shard to query; `None` uses the configured default
    /// * `force_refresh` - Bypass the cache and refetch
    pub async fn player_rating(
        &self,
        player: &PlayerKey,
        region: Option<&str>,
        force_refresh: bool,
    ) -> FetchResult<PlayerRating> {
        self.ensure_enabled()?;
        let request = self.rating_request(player, self.region(region))?;
        let payload = self
            .fetcher
            .fetch_json(&request.key, &request.category, &request.url, force_refresh)
            .await?;
        PlayerRating::from_payload(&payload)
    }

    /// Recent rating changes, returned as the provider sent them.
    pub async fn rating_history(
        &self,
        player: &PlayerKey,
        region: Option<&str>,
        force_refresh: bool,
    ) -> FetchResult<Value> {
        self.ensure_enabled()?;
        let region = self.region(region);
        let key = format!("rating_history_{region}_{}", player.cache_fragment());
        let url = self.url_with_segments(&[
            "v2",
            "mmr-history",
            region,
            "pc",
            player.name(),
            player.tag(),
        ])?;
        self.fetcher
            .fetch_json(&key, "rating_history", &url, force_refresh)
            .await
    }

    /// Full stored rating history, as far back as the provider keeps it.
    pub async fn stored_history(
        &self,
        player: &PlayerKey,
        region: Option<&str>,
        force_refresh: bool,
    ) -> FetchResult<Value> {
        self.ensure_enabled()?;
        let region = self.region(region);
        let key = format!("stored_history_{region}_{}", player.cache_fragment());
        let url = self.url_with_segments(&[
            "v2",
            "stored-mmr-history",
            region,
            "pc",
            player.name(),
            player.tag(),
        ])?;
        self.fetcher
            .fetch_json(&key, "stored_history", &url, force_refresh)
            .await
    }

    /// Stored match list for one player. This endpoint has no platform
    /// segment in its path.
    pub async fn match_history(
        &self,
        player: &PlayerKey,
        region: Option<&str>,
        force_refresh: bool,
    ) -> FetchResult<Value> {
        self.ensure_enabled()?;
        let region = self.region(region);
        let key = format!("matches_{region}_{}", player.cache_fragment());
        let url = self.url_with_segments(&[
            "v1",
            "stored-matches",
            region,
            player.name(),
            player.tag(),
        ])?;
        self.fetcher
            .fetch_json(&key, "matches", &url, force_refresh)
            .await
    }

    /// Full detail for one finished match, rounds and kill events included.
    pub async fn match_details(&self, match_id: &str, force_refresh: bool) -> FetchResult<Value> {
        self.ensure_enabled()?;
        if match_id.is_empty() {
            log::warn!("ladder: match_details called with an empty match id");
            return Err(FetchError::Internal("match id must not be empty".to_string()));
        }
        let key = format!("match_{match_id}");
        let url = self.url_with_segments(&["v2", "match", match_id])?;
        self.fetcher
            .fetch_json(&key, "match", &url, force_refresh)
            .await
    }

    /// Ratings for many players in rate-limit-friendly groups.
    ///
    /// Players are fetched `batch.batch_size` at a time with the configured
    /// pause between groups; warm cache entries cost nothing. A player whose
    /// fetch or parse fails keeps their own error entry. A provider rate
    /// limit aborts the remainder of the run; everything fetched up to that
    /// point is still returned alongside the aborting error.
    pub async fn batch_ratings(
        &self,
        players: &[PlayerKey],
        region: Option<&str>,
        force_refresh: bool,
    ) -> FetchResult<BatchRatings> {
        self.ensure_enabled()?;
        let region = self.region(region);

        let mut requests = Vec::with_capacity(players.len());
        let mut players_by_key = HashMap::with_capacity(players.len());
        for player in players {
            let request = self.rating_request(player, region)?;
            players_by_key.insert(request.key.clone(), player.clone());
            requests.push(request);
        }

        let outcome = self
            .fetcher
            .fetch_many(
                &requests,
                self.batch.batch_size,
                Duration::from_millis(self.batch.inter_batch_delay_ms),
                force_refresh,
            )
            .await;

        let mut ratings = BTreeMap::new();
        for (key, result) in outcome.results {
            let Some(player) = players_by_key.remove(&key) else {
                continue;
            };
            let rating = result.and_then(|payload| PlayerRating::from_payload(&payload));
            ratings.insert(player, rating);
        }

        Ok(BatchRatings {
            ratings,
            aborted: outcome.aborted,
        })
    }

    /// Drop every cached entry for one player, across regions and
    /// categories. Used when a caller knows the cached state is wrong, for
    /// example right after watching the player finish a match.
    pub fn invalidate_player(&self, player: &PlayerKey) -> usize {
        let removed = self
            .fetcher
            .cache()
            .invalidate_matching(&player.cache_fragment());
        log::info!("ladder: invalidated {removed} cached entries for {player}");
        removed
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
        log::info!("ladder: cleared {removed} cached entries");
        removed
    }

    /// Drop cached entries whose key starts with `prefix`.
    pub fn clear_prefix(&self, prefix: &str) -> usize {
        self.fetcher.cache().clear_prefix(prefix)
    }
}

impl std::fmt::Debug for LadderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LadderClient")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("default_region", &self.default_region)
            .finish()
    }
}
