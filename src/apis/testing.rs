//! Scripted transport for exercising the fetch stack without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::client::{HttpTransport, RawResponse};
use crate::errors::{FetchError, FetchResult, UnavailableKind};

/// One canned reply for a URL.
#[derive(Debug, Clone)]
pub enum Scripted {
    Response {
        status: u16,
        body: String,
        retry_after_secs: Option<u64>,
    },
    Timeout,
    NetworkError(String),
}

impl Scripted {
    pub fn ok(body: &str) -> Self {
        Scripted::Response {
            status: 200,
            body: body.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Scripted::Response {
            status,
            body: body.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn not_found() -> Self {
        Self::status(404, "{\"errors\":[{\"message\":\"not found\"}]}")
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Scripted::Response {
            status: 429,
            body: String::new(),
            retry_after_secs,
        }
    }

    pub fn server_error() -> Self {
        Self::status(503, "service unavailable")
    }
}

/// In-memory [`HttpTransport`] that replays scripted replies per URL.
///
/// Replies for a URL are consumed in order; the last one repeats once the
/// queue would run dry, so "same answer every time" needs only one script.
/// Every call is counted, which is how tests assert deduplication and TTL
/// behaviour.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: AtomicUsize,
    calls_by_url: Mutex<HashMap<String, usize>>,
    /// Simulated network latency applied to every call.
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `url`.
    pub fn script(&self, url: &str, reply: Scripted) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Make every call take `delay` before answering. Lets tests force
    /// requests to overlap under a paused clock.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Total calls across all URLs.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls_by_url.lock().get(url).copied().unwrap_or(0)
    }

    fn next_reply(&self, url: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str) -> FetchResult<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_url
            .lock()
            .entry(url.to_string())
            .or_insert(0) += 1;

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(url) {
            Some(Scripted::Response {
                status,
                body,
                retry_after_secs,
            }) => Ok(RawResponse {
                status,
                retry_after_secs,
                body,
            }),
            Some(Scripted::Timeout) => Err(FetchError::unavailable(
                UnavailableKind::Timeout,
                format!("request to {url} timed out"),
            )),
            Some(Scripted::NetworkError(message)) => {
                Err(FetchError::unavailable(UnavailableKind::Network, message))
            }
            None => Err(FetchError::unavailable(
                UnavailableKind::Network,
                format!("no scripted response for {url}"),
            )),
        }
    }
}
