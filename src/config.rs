//! Configuration for providers, rate limits, cache TTLs and batching.
//!
//! Loaded from a JSON file. A missing file is created with defaults so a
//! fresh checkout starts with a complete, editable config on disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Default config file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "lootdex.json";

/// Environment variable consulted when `ladder.api_key` is empty.
pub const LADDER_API_KEY_ENV: &str = "LADDER_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub ladder: LadderConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests admitted inside one sliding window.
    pub max_requests_per_window: usize,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Maximum requests in flight at once.
    pub max_concurrent: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 60,
            window_seconds: 60,
            max_concurrent: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub enabled: bool,
    /// Base URL of the item price API.
    pub base_url: String,
    /// Base URL of the trade-volume endpoint (separate host).
    pub volumes_url: String,
    /// Identifying User-Agent, required by the price API's usage policy.
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub rate_limit: RateLimitConfig,
    /// Per-category TTL overrides in seconds. Unlisted categories keep the
    /// client's built-in defaults.
    #[serde(default)]
    pub ttl_overrides: HashMap<String, u64>,
    /// TTL for categories with no built-in default and no override.
    pub default_ttl_seconds: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://prices.runescape.wiki/api/v1/osrs".to_string(),
            volumes_url: "https://api.weirdgloop.org/exchange/history/osrs/latest".to_string(),
            user_agent: "lootdex".to_string(),
            timeout_seconds: 15,
            rate_limit: RateLimitConfig::default(),
            ttl_overrides: HashMap::new(),
            default_ttl_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderConfig {
    pub enabled: bool,
    pub base_url: String,
    /// API key sent as the Authorization header. Falls back to the
    /// `LADDER_API_KEY` environment variable when empty.
    #[serde(default)]
    pub api_key: String,
    /// Region used when a call does not specify one.
    pub default_region: String,
    pub timeout_seconds: u64,
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub ttl_overrides: HashMap<String, u64>,
    pub default_ttl_seconds: u64,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.henrikdev.xyz/valorant".to_string(),
            api_key: String::new(),
            default_region: "na".to_string(),
            timeout_seconds: 15,
            rate_limit: RateLimitConfig::default(),
            ttl_overrides: HashMap::new(),
            default_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Keys fetched concurrently per group.
    pub batch_size: usize,
    /// Pause between groups in milliseconds.
    pub inter_batch_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_batch_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Load config from `path`, writing a default file first if none exists.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("created default config at {}", path.display());
            return Ok(config.with_env_overrides());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;

        Ok(config.with_env_overrides())
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create config dir {}", parent.display()))?;
            }
        }
        let contents = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Reject configs the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("exchange", &self.exchange.rate_limit),
            ("ladder", &self.ladder.rate_limit),
        ] {
            anyhow::ensure!(
                rate.max_requests_per_window > 0,
                "{name}.rate_limit.max_requests_per_window must be at least 1"
            );
            anyhow::ensure!(
                rate.window_seconds > 0,
                "{name}.rate_limit.window_seconds must be at least 1"
            );
            anyhow::ensure!(
                rate.max_concurrent > 0,
                "{name}.rate_limit.max_concurrent must be at least 1"
            );
        }
        anyhow::ensure!(
            self.batch.batch_size > 0,
            "batch.batch_size must be at least 1"
        );
        anyhow::ensure!(
            self.exchange.timeout_seconds > 0 && self.ladder.timeout_seconds > 0,
            "timeout_seconds must be at least 1"
        );
        Ok(())
    }

    /// Fill secrets from the environment when the file leaves them blank.
    fn with_env_overrides(mut self) -> Self {
        if self.ladder.api_key.is_empty() {
            if let Ok(key) = std::env::var(LADDER_API_KEY_ENV) {
                self.ladder.api_key = key;
            }
        }
        if self.ladder.enabled && self.ladder.api_key.is_empty() {
            log::warn!(
                "ladder client enabled but no API key set (config or {})",
                LADDER_API_KEY_ENV
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lootdex.json");

        let config = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.batch.batch_size, 5);
        assert_eq!(config.exchange.rate_limit.window_seconds, 60);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lootdex.json");

        let mut config = Config::default();
        config.ladder.default_region = "eu".to_string();
        config
            .exchange
            .ttl_overrides
            .insert("mapping".to_string(), 7200);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.ladder.default_region, "eu");
        assert_eq!(loaded.exchange.ttl_overrides.get("mapping"), Some(&7200));
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut config = Config::default();
        config.exchange.rate_limit.window_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.batch.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
