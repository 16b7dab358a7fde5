//! Facade that wires configuration, provider clients and the catalog index
//! into one handle applications hold on to.

use serde::Serialize;

use crate::apis::exchange::types::{CatalogItem, ItemOverview};
use crate::apis::exchange::ExchangeClient;
use crate::apis::ladder::LadderClient;
use crate::cache::CacheStats;
use crate::catalog::{CatalogIndex, DEFAULT_SEARCH_LIMIT};
use crate::config::Config;
use crate::errors::{FetchError, FetchResult};

/// Combined counters for dashboards and CLI output.
#[derive(Debug, Serialize)]
pub struct ServiceStats {
    pub exchange: CacheStats,
    pub ladder: CacheStats,
    pub catalog_items: usize,
}

pub struct DataService {
    config: Config,
    exchange: ExchangeClient,
    ladder: LadderClient,
    catalog: CatalogIndex,
}

impl DataService {
    pub fn new(config: Config) -> FetchResult<Self> {
        let exchange = ExchangeClient::new(&config.exchange, &config.batch)?;
        let ladder = LadderClient::new(&config.ladder, &config.batch)?;
        Ok(Self {
            config,
            exchange,
            ladder,
            catalog: CatalogIndex::new(),
        })
    }

    /// Load the catalog and build the search index. Called once at startup;
    /// calling again is harmless.
    pub async fn initialize(&self) -> FetchResult<usize> {
        self.refresh_catalog(false).await
    }

    /// Refetch the catalog listing and republish the search index.
    /// Returns the number of indexed items.
    pub async fn refresh_catalog(&self, force_refresh: bool) -> FetchResult<usize> {
        if !self.exchange.is_enabled() {
            log::warn!("exchange client disabled, catalog index stays empty");
            return Ok(0);
        }
        let items = self.exchange.item_catalog(force_refresh).await?;
        self.catalog.rebuild(items);
        Ok(self.catalog.len())
    }

    /// Ranked item search. `limit` defaults to
    /// [`DEFAULT_SEARCH_LIMIT`](crate::catalog::DEFAULT_SEARCH_LIMIT).
    pub fn search_items(&self, query: &str, limit: Option<usize>) -> Vec<CatalogItem> {
        self.catalog
            .search(query, limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
    }

    pub fn item_by_name(&self, name: &str) -> Option<CatalogItem> {
        self.catalog.lookup_name(name)
    }

    pub fn item_by_id(&self, id: i64) -> Option<CatalogItem> {
        self.catalog.get(id)
    }

    /// Overview for an item addressed by display name. The name must
    /// resolve through the index; prices and history come from the
    /// exchange client.
    pub async fn item_overview_by_name(
        &self,
        name: &str,
        force_refresh: bool,
    ) -> FetchResult<ItemOverview> {
        let item = self
            .catalog
            .lookup_name(name)
            .ok_or_else(|| FetchError::not_found(format!("catalog item '{}'", name.trim())))?;
        self.exchange.item_overview(item.id, force_refresh).await
    }

    pub fn exchange(&self) -> &ExchangeClient {
        &self.exchange
    }

    pub fn ladder(&self) -> &LadderClient {
        &self.ladder
    }

    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn stats(&self) -> ServiceStats {
        ServiceStats {
            exchange: self.exchange.stats().await,
            ladder: self.ladder.stats().await,
            catalog_items: self.catalog.len(),
        }
    }

    /// Drop every cached payload in both providers. The catalog index is
    /// untouched; refresh it explicitly when needed.
    pub fn clear_caches(&self) -> usize {
        self.exchange.clear_cache() + self.ladder.clear_cache()
    }

    pub fn reset_stats(&self) {
        self.exchange.reset_stats();
        self.ladder.reset_stats();
    }
}

impl std::fmt::Debug for DataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataService")
            .field("exchange", &self.exchange)
            .field("ladder", &self.ladder)
            .field("catalog", &self.catalog)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::testing::{MockTransport, Scripted};
    use crate::config::{ExchangeConfig, LadderConfig};
    use std::sync::Arc;

    const EX_BASE: &str = "http://exchange.test";
    const LAD_BASE: &str = "http://ladder.test";

    fn service(exchange: Arc<MockTransport>, ladder: Arc<MockTransport>) -> DataService {
        let config = Config {
            exchange: ExchangeConfig {
                base_url: EX_BASE.to_string(),
                volumes_url: "http://volumes.test/latest".to_string(),
                ..ExchangeConfig::default()
            },
            ladder: LadderConfig {
                base_url: LAD_BASE.to_string(),
                ..LadderConfig::default()
            },
            batch: Default::default(),
        };
        DataService {
            exchange: ExchangeClient::with_transport(exchange, &config.exchange, &config.batch),
            ladder: LadderClient::with_transport(ladder, &config.ladder, &config.batch),
            catalog: CatalogIndex::new(),
            config,
        }
    }

    fn script_catalog(transport: &MockTransport) {
        transport.script(
            &format!("{EX_BASE}/mapping"),
            Scripted::ok(
                r#"[{"id":4151,"name":"Abyssal whip","limit":70},{"id":2,"name":"Cannonball"}]"#,
            ),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_builds_the_index() {
        let exchange = Arc::new(MockTransport::new());
        script_catalog(&exchange);
        let service = service(exchange.clone(), Arc::new(MockTransport::new()));

        let indexed = service.initialize().await.unwrap();
        assert_eq!(indexed, 2);
        assert_eq!(service.item_by_name("abyssal whip").unwrap().id, 4151);
        assert_eq!(service.item_by_id(2).unwrap().name, "Cannonball");
        assert_eq!(service.search_items("whip", None).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_skips_disabled_exchange() {
        let exchange = Arc::new(MockTransport::new());
        let mut service = service(exchange.clone(), Arc::new(MockTransport::new()));
        let mut config = service.config.exchange.clone();
        config.enabled = false;
        service.exchange =
            ExchangeClient::with_transport(exchange.clone(), &config, &service.config.batch);

        let indexed = service.initialize().await.unwrap();
        assert_eq!(indexed, 0);
        assert_eq!(exchange.calls(), 0);
        assert!(service.catalog().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overview_by_name_resolves_through_the_index() {
        let exchange = Arc::new(MockTransport::new());
        script_catalog(&exchange);
        exchange.script(
            &format!("{EX_BASE}/latest?id=4151"),
            Scripted::ok(r#"{"data":{"4151":{"high":143000}}}"#),
        );
        for step in ["5m", "1h", "6h", "24h"] {
            exchange.script(
                &format!("{EX_BASE}/timeseries?timestep={step}&id=4151"),
                Scripted::ok(r#"{"data":[{"timestamp":1}]}"#),
            );
        }
        let service = service(exchange.clone(), Arc::new(MockTransport::new()));
        service.initialize().await.unwrap();

        let overview = service
            .item_overview_by_name("Abyssal Whip", false)
            .await
            .unwrap();
        assert_eq!(overview.item.unwrap().id, 4151);
        assert_eq!(overview.latest.unwrap().high, Some(143_000));
        assert_eq!(overview.history.len(), 4);

        let missing = service.item_overview_by_name("no such item", false).await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn stats_combine_both_providers() {
        let exchange = Arc::new(MockTransport::new());
        script_catalog(&exchange);
        let ladder = Arc::new(MockTransport::new());
        ladder.script(
            &format!("{LAD_BASE}/v3/mmr/na/pc/tenz/sen"),
            Scripted::ok(r#"{"data":{"current":{"tier":{"name":"Radiant"},"rr":500}}}"#),
        );
        let service = service(exchange.clone(), ladder.clone());

        service.initialize().await.unwrap();
        service
            .ladder()
            .player_rating(&crate::apis::ladder::types::PlayerKey::new("tenz", "sen"), None, false)
            .await
            .unwrap();

        let stats = service.stats().await;
        assert_eq!(stats.exchange.api_calls, 1);
        assert_eq!(stats.ladder.api_calls, 1);
        assert_eq!(stats.catalog_items, 2);

        let cleared = service.clear_caches();
        assert_eq!(cleared, 2);
        // The index survives a cache clear.
        assert_eq!(service.catalog().len(), 2);

        service.reset_stats();
        let stats = service.stats().await;
        assert_eq!(stats.exchange.api_calls, 0);
        assert_eq!(stats.ladder.api_calls, 0);
    }
}
