//! Error taxonomy for remote data fetches.
//!
//! Every failure a provider call can produce is classified into one of a
//! fixed set of kinds so that callers (and the batch orchestrator) can react
//! uniformly: `NotFound` is terminal for the key, `RateLimited` carries the
//! provider's retry hint and aborts batch runs, `Unavailable` is transient
//! and eligible for stale-cache fallback, `InvalidResponse` means the body
//! did not have the expected shape and is never cached.

use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type FetchResult<T> = Result<T, FetchError>;

/// What made a provider unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableKind {
    /// The request exceeded its deadline.
    Timeout,
    /// Connection-level failure (DNS, refused, reset, TLS).
    Network,
    /// The provider answered with an unexpected HTTP status (5xx etc).
    Server,
}

impl std::fmt::Display for UnavailableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnavailableKind::Timeout => write!(f, "timeout"),
            UnavailableKind::Network => write!(f, "network"),
            UnavailableKind::Server => write!(f, "server"),
        }
    }
}

/// Unified error type for all provider fetches.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The entity does not exist upstream (HTTP 404). Never cached, so a
    /// later successful fetch for the same key remains possible.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// The provider told us to back off (HTTP 429).
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Transient outage: timeout, connection failure, or server error.
    #[error("provider unavailable ({kind}): {message}")]
    Unavailable {
        kind: UnavailableKind,
        message: String,
    },

    /// HTTP 200 but the payload did not parse into the expected shape.
    #[error("invalid response for {key}: {message}")]
    InvalidResponse { key: String, message: String },

    /// The client is turned off in configuration.
    #[error("client disabled: {0}")]
    Disabled(String),

    /// Broken internal invariant (poisoned semaphore, bad base URL, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    pub fn not_found(key: impl Into<String>) -> Self {
        FetchError::NotFound { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::InvalidResponse {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(kind: UnavailableKind, message: impl Into<String>) -> Self {
        FetchError::Unavailable {
            kind,
            message: message.into(),
        }
    }

    /// True for errors where a stale cache entry may be served instead.
    pub fn allows_stale_fallback(&self) -> bool {
        matches!(self, FetchError::Unavailable { .. })
    }

    /// Retry hint in seconds, present only for `RateLimited`.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            FetchError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}
