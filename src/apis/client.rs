//! Shared HTTP plumbing for provider clients: the transport seam, raw
//! response classification and the sliding-window rate limiter.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::errors::{FetchError, FetchResult, UnavailableKind};

/// Retry hint applied when a 429 has no usable Retry-After header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

// ===== Transport =====

/// Raw HTTP response, before any interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Parsed Retry-After header, when present and numeric.
    pub retry_after_secs: Option<u64>,
    pub body: String,
}

/// How a response should be handled, independent of which provider sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// HTTP 200. The body still has to parse as JSON.
    Success,
    /// HTTP 404. Terminal for the key, never cached.
    NotFound,
    /// HTTP 429 with the provider's retry hint.
    RateLimited { retry_after_secs: u64 },
    /// Any other status. Transient, eligible for stale-cache fallback.
    Unavailable,
}

impl RawResponse {
    pub fn classify(&self) -> ResponseClass {
        match self.status {
            200 => ResponseClass::Success,
            404 => ResponseClass::NotFound,
            429 => ResponseClass::RateLimited {
                retry_after_secs: self.retry_after_secs.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            _ => ResponseClass::Unavailable,
        }
    }
}

/// Minimal GET transport the fetch layer runs on.
///
/// `Err` is reserved for requests that produced no HTTP response at all
/// (timeout, connection failure); anything with a status code comes back as
/// `Ok` and is classified by the caller.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> FetchResult<RawResponse>;
}

/// reqwest-backed transport with a fixed timeout and optional auth header.
pub struct HttpClient {
    client: Client,
    api_key: Option<String>,
}

impl HttpClient {
    pub fn new(timeout_secs: u64, user_agent: &str, api_key: Option<String>) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Internal(format!("failed to build http client: {e}")))?;

        Ok(Self { client, api_key })
    }

    fn map_send_error(url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::unavailable(UnavailableKind::Timeout, format!("request to {url} timed out"))
        } else {
            FetchError::unavailable(UnavailableKind::Network, err.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn get(&self, url: &str) -> FetchResult<RawResponse> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;

        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .map(|secs| secs.max(0.0) as u64);

        let body = response
            .text()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;

        Ok(RawResponse {
            status,
            retry_after_secs,
            body,
        })
    }
}

// ===== Rate limiting =====

/// Sliding-window request limiter with a concurrency cap.
///
/// The window tracks admission timestamps: a request is admitted once fewer
/// than `max_in_window` admissions fall inside the trailing window, waiting
/// for the oldest one to age out otherwise. Admission also records the
/// timestamp, so waiting never grants more than the configured budget.
/// Separately, a semaphore bounds how many requests are in flight at once;
/// its permit is held by the returned guard and released on drop whether the
/// request succeeds or fails.
pub struct RateLimiter {
    max_in_window: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_in_window: config.max_requests_per_window.max(1),
            window: Duration::from_secs(config.window_seconds.max(1)),
            timestamps: Mutex::new(VecDeque::new()),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    /// Wait for window room and a concurrency permit, then admit the request.
    pub async fn acquire(&self) -> FetchResult<RateLimitGuard> {
        loop {
            let wait = {
                let mut stamps = self.timestamps.lock().await;
                let now = Instant::now();
                Self::prune(&mut stamps, now, self.window);
                if stamps.len() < self.max_in_window {
                    stamps.push_back(now);
                    None
                } else {
                    // Room opens when the oldest admission ages out.
                    let oldest = stamps[0];
                    Some(self.window.saturating_sub(now.duration_since(oldest)))
                }
            };

            match wait {
                None => break,
                Some(wait) => {
                    log::debug!(
                        "rate window full ({} in {:?}), waiting {:.1}s",
                        self.max_in_window,
                        self.window,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| FetchError::Internal(format!("rate limiter semaphore closed: {e}")))?;

        Ok(RateLimitGuard { _permit: permit })
    }

    fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = stamps.front() {
            if now.duration_since(*oldest) >= window {
                stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admissions still inside the current window.
    pub async fn in_window(&self) -> usize {
        let mut stamps = self.timestamps.lock().await;
        let now = Instant::now();
        Self::prune(&mut stamps, now, self.window);
        stamps.len()
    }

    pub fn max_in_window(&self) -> usize {
        self.max_in_window
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// RAII guard returned by [`RateLimiter::acquire`].
pub struct RateLimitGuard {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn limit(max_requests: usize, window_seconds: u64, max_concurrent: usize) -> RateLimitConfig {
        RateLimitConfig {
            max_requests_per_window: max_requests,
            window_seconds,
            max_concurrent,
        }
    }

    #[test]
    fn classify_maps_statuses() {
        let ok = RawResponse {
            status: 200,
            retry_after_secs: None,
            body: "{}".to_string(),
        };
        assert_eq!(ok.classify(), ResponseClass::Success);

        let missing = RawResponse {
            status: 404,
            retry_after_secs: None,
            body: String::new(),
        };
        assert_eq!(missing.classify(), ResponseClass::NotFound);

        let throttled = RawResponse {
            status: 429,
            retry_after_secs: Some(7),
            body: String::new(),
        };
        assert_eq!(
            throttled.classify(),
            ResponseClass::RateLimited {
                retry_after_secs: 7
            }
        );

        for status in [500, 502, 503, 204, 301] {
            let other = RawResponse {
                status,
                retry_after_secs: None,
                body: String::new(),
            };
            assert_eq!(other.classify(), ResponseClass::Unavailable);
        }
    }

    #[test]
    fn classify_defaults_missing_retry_after() {
        let throttled = RawResponse {
            status: 429,
            retry_after_secs: None,
            body: String::new(),
        };
        assert_eq!(
            throttled.classify(),
            ResponseClass::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn within_capacity_no_wait() {
        let limiter = RateLimiter::new(&limit(10, 60, 10));
        let start = Instant::now();
        for _ in 0..10 {
            let _guard = limiter.acquire().await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn over_capacity_waits_for_oldest_to_age_out() {
        let limiter = RateLimiter::new(&limit(10, 60, 10));
        let start = Instant::now();
        for _ in 0..15 {
            let _guard = limiter.acquire().await.unwrap();
        }
        // Requests 11..15 had to wait for the first window to expire.
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(limiter.in_window().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn window_prunes_as_time_passes() {
        let limiter = RateLimiter::new(&limit(10, 60, 10));
        for _ in 0..4 {
            let _guard = limiter.acquire().await.unwrap();
        }
        assert_eq!(limiter.in_window().await, 4);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.in_window().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_by_semaphore() {
        let limiter = Arc::new(RateLimiter::new(&limit(100, 60, 2)));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let current = current.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = limiter.acquire().await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn guard_drop_releases_permit() {
        let limiter = RateLimiter::new(&limit(100, 60, 1));
        {
            let _guard = limiter.acquire().await.unwrap();
        }
        // Second acquire must not deadlock now that the guard is gone.
        let _guard = limiter.acquire().await.unwrap();
    }
}
