//! Player identity and rating types for the ladder API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FetchError, FetchResult};

/// Identity of one ladder account.
///
/// Name and tag are trimmed and lowercased on construction so the same
/// player always maps to the same cache keys, however the caller spelled
/// them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerKey {
    name: String,
    tag: String,
}

impl PlayerKey {
    pub fn new(name: &str, tag: &str) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            tag: tag.trim().to_lowercase(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Fragment embedded in every cache key that belongs to this player.
    /// Cache invalidation matches on it.
    pub fn cache_fragment(&self) -> String {
        format!("{}_{}", self.name, self.tag)
    }
}

impl std::fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.tag)
    }
}

/// Competitive standing distilled from a rating payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerRating {
    /// Tier name, or [`PlayerRating::UNRATED`] while placements are pending.
    pub rank: String,
    /// Rating points inside the tier.
    pub elo: i64,
    /// Placement games left before a rank is assigned, 0 once rated.
    pub games_needed: i64,
}

impl PlayerRating {
    pub const UNRATED: &'static str = "Unrated";

    pub fn is_unrated(&self) -> bool {
        self.rank == Self::UNRATED
    }

    /// Distill a raw rating payload.
    ///
    /// Accounts still in placements report `games_needed_for_rating > 0`
    /// and become an unrated placeholder. A payload without the
    /// `data.current` structure is rejected as invalid rather than guessed
    /// at.
    pub fn from_payload(payload: &Value) -> FetchResult<Self> {
        let data = payload
            .get("data")
            .ok_or_else(|| FetchError::invalid("rating", "missing data object"))?;

        let current = match data.get("current") {
            Some(Value::Object(map)) if !map.is_empty() => map,
            _ => {
                log::warn!("rating payload has no current section");
                return Err(FetchError::invalid("rating", "missing current section"));
            }
        };

        let games_needed = current
            .get("games_needed_for_rating")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if games_needed > 0 {
            return Ok(Self {
                rank: Self::UNRATED.to_string(),
                elo: 0,
                games_needed,
            });
        }

        let rank = current
            .get("tier")
            .and_then(|tier| tier.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        if rank == "Unknown" {
            log::warn!("could not determine rank from rating payload");
        }
        let elo = current.get("rr").and_then(Value::as_i64).unwrap_or(0);

        Ok(Self {
            rank,
            elo,
            games_needed: 0,
        })
    }
}
