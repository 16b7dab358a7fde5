//! Multi-key fetches in bounded concurrent groups.

use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use super::fetcher::Fetcher;
use crate::errors::{FetchError, FetchResult};

/// One key to fetch as part of a batch.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub key: String,
    pub category: String,
    pub url: String,
}

/// Result of a batch run.
///
/// `results` holds an entry for every key that was processed: the payload on
/// success, or that key's own error. A provider-side rate limit aborts the
/// run instead; the limiting error moves to `aborted` and keys after it are
/// left out entirely so callers can retry just the remainder later.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: BTreeMap<String, FetchResult<Value>>,
    pub aborted: Option<FetchError>,
}

impl BatchOutcome {
    pub fn is_rate_limited(&self) -> bool {
        self.aborted
            .as_ref()
            .map(FetchError::is_rate_limited)
            .unwrap_or(false)
    }

    pub fn successes(&self) -> usize {
        self.results.values().filter(|r| r.is_ok()).count()
    }
}

impl Fetcher {
    /// Fetch many keys through [`Fetcher::fetch_json`], `batch_size` at a
    /// time, sleeping `inter_batch_delay` between groups. Cached keys are
    /// served from cache like any other fetch, so a warm batch costs no
    /// requests. Individual failures become per-key result entries; a
    /// `RateLimited` error stops the whole run.
    pub async fn fetch_many(
        &self,
        requests: &[BatchRequest],
        batch_size: usize,
        inter_batch_delay: Duration,
        force_refresh: bool,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if requests.is_empty() {
            return outcome;
        }

        let batch_size = batch_size.max(1);
        let total_groups = (requests.len() + batch_size - 1) / batch_size;

        for (group_idx, group) in requests.chunks(batch_size).enumerate() {
            log::debug!(
                "{}: batch group {}/{} ({} keys)",
                self.provider(),
                group_idx + 1,
                total_groups,
                group.len()
            );

            let fetches = group
                .iter()
                .map(|req| self.fetch_json(&req.key, &req.category, &req.url, force_refresh));
            let results = join_all(fetches).await;

            for (req, result) in group.iter().zip(results) {
                match result {
                    Err(err) if err.is_rate_limited() => {
                        log::warn!(
                            "{}: batch aborted by rate limit at {} (retry after {:?}s)",
                            self.provider(),
                            req.key,
                            err.retry_after()
                        );
                        outcome.aborted = Some(err);
                        return outcome;
                    }
                    other => {
                        if let Err(err) = &other {
                            log::warn!("{}: batch key {} failed: {}", self.provider(), req.key, err);
                        }
                        outcome.results.insert(req.key.clone(), other);
                    }
                }
            }

            if group_idx + 1 < total_groups && !inter_batch_delay.is_zero() {
                tokio::time::sleep(inter_batch_delay).await;
            }
        }

        outcome
    }
}
