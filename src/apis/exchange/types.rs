//! Typed views over the exchange API payloads.
//!
//! The fetch layer caches payloads as raw JSON; these types and parse
//! helpers are applied on the way out, so a shape change upstream surfaces
//! as `InvalidResponse` instead of a panic deep in a caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::{FetchError, FetchResult};

/// Aggregation step accepted by the period and timeseries endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timestep {
    FiveMinutes,
    OneHour,
    SixHours,
    Day,
}

impl Timestep {
    pub const ALL: [Timestep; 4] = [
        Timestep::FiveMinutes,
        Timestep::OneHour,
        Timestep::SixHours,
        Timestep::Day,
    ];

    /// Path/query segment the API expects.
    pub fn as_str(self) -> &'static str {
        match self {
            Timestep::FiveMinutes => "5m",
            Timestep::OneHour => "1h",
            Timestep::SixHours => "6h",
            Timestep::Day => "24h",
        }
    }
}

impl std::fmt::Display for Timestep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timestep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5m" => Ok(Timestep::FiveMinutes),
            "1h" => Ok(Timestep::OneHour),
            "6h" => Ok(Timestep::SixHours),
            "24h" => Ok(Timestep::Day),
            other => Err(format!("unknown timestep '{other}' (expected 5m, 1h, 6h or 24h)")),
        }
    }
}

/// One tradeable item from the catalog endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub members: bool,
    /// Buy limit per 4 hours, absent for unlimited items.
    #[serde(default, rename = "limit")]
    pub buy_limit: Option<u32>,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub highalch: Option<i64>,
    #[serde(default)]
    pub lowalch: Option<i64>,
    #[serde(default)]
    pub examine: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Instantaneous buy/sell quote from the latest-prices endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    #[serde(default)]
    pub high: Option<i64>,
    #[serde(default)]
    pub high_time: Option<i64>,
    #[serde(default)]
    pub low: Option<i64>,
    #[serde(default)]
    pub low_time: Option<i64>,
}

/// One bucket of an item's price history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub timestamp: i64,
    #[serde(default)]
    pub avg_high_price: Option<i64>,
    #[serde(default)]
    pub avg_low_price: Option<i64>,
    #[serde(default)]
    pub high_price_volume: Option<i64>,
    #[serde(default)]
    pub low_price_volume: Option<i64>,
}

/// Per-item aggregate over one period (5m, 1h, ...).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStats {
    #[serde(default)]
    pub avg_high_price: Option<i64>,
    #[serde(default)]
    pub avg_low_price: Option<i64>,
    #[serde(default)]
    pub high_price_volume: Option<i64>,
    #[serde(default)]
    pub low_price_volume: Option<i64>,
}

/// Daily traded volume for one item, from the volumes endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VolumePoint {
    pub id: Option<i64>,
    pub price: Option<i64>,
    pub volume: Option<f64>,
    pub timestamp: Option<String>,
}

/// Everything known about one item, assembled by
/// [`ExchangeClient::item_overview`](super::ExchangeClient::item_overview).
/// Sections the provider could not answer are left empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ItemOverview {
    pub item: Option<CatalogItem>,
    pub latest: Option<PriceQuote>,
    /// Price history keyed by timestep ("5m", "1h", "6h", "24h").
    pub history: HashMap<String, Vec<PricePoint>>,
}

// ===== Parse helpers =====

/// `{"data": {"<id>": quote}}` into per-item quotes.
pub fn parse_latest(mut payload: Value) -> FetchResult<HashMap<i64, PriceQuote>> {
    let data = take_data_object(&mut payload, "latest")?;
    let mut quotes = HashMap::with_capacity(data.len());
    for (id, quote) in data {
        let id: i64 = id
            .parse()
            .map_err(|_| FetchError::invalid("latest", format!("non-numeric item id '{id}'")))?;
        let quote: PriceQuote = serde_json::from_value(quote)
            .map_err(|e| FetchError::invalid("latest", format!("bad quote for item {id}: {e}")))?;
        quotes.insert(id, quote);
    }
    Ok(quotes)
}

/// The catalog payload is a bare array of items.
pub fn parse_catalog(payload: Value) -> FetchResult<Vec<CatalogItem>> {
    serde_json::from_value(payload)
        .map_err(|e| FetchError::invalid("mapping", format!("bad catalog payload: {e}")))
}

/// `{"data": [point, ...]}` into history points.
pub fn parse_timeseries(mut payload: Value) -> FetchResult<Vec<PricePoint>> {
    let data = payload
        .get_mut("data")
        .map(Value::take)
        .ok_or_else(|| FetchError::invalid("timeseries", "missing data array"))?;
    serde_json::from_value(data)
        .map_err(|e| FetchError::invalid("timeseries", format!("bad timeseries payload: {e}")))
}

/// `{"data": {"<id>": stats}}` into per-item period aggregates.
pub fn parse_period(mut payload: Value) -> FetchResult<HashMap<i64, PeriodStats>> {
    let data = take_data_object(&mut payload, "period")?;
    let mut stats = HashMap::with_capacity(data.len());
    for (id, entry) in data {
        let id: i64 = id
            .parse()
            .map_err(|_| FetchError::invalid("period", format!("non-numeric item id '{id}'")))?;
        let entry: PeriodStats = serde_json::from_value(entry)
            .map_err(|e| FetchError::invalid("period", format!("bad stats for item {id}: {e}")))?;
        stats.insert(id, entry);
    }
    Ok(stats)
}

/// Lenient extraction of one volumes entry. The volumes provider mixes
/// status fields into its top-level object, so anything without the
/// expected shape is simply not an item.
pub fn volume_from_value(value: &Value) -> Option<VolumePoint> {
    let obj = value.as_object()?;
    if !obj.contains_key("id") && !obj.contains_key("price") && !obj.contains_key("volume") {
        return None;
    }
    Some(VolumePoint {
        id: obj.get("id").and_then(Value::as_i64),
        price: obj.get("price").and_then(Value::as_i64),
        volume: obj.get("volume").and_then(Value::as_f64),
        timestamp: obj
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn take_data_object(
    payload: &mut Value,
    label: &str,
) -> FetchResult<serde_json::Map<String, Value>> {
    match payload.get_mut("data").map(Value::take) {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(FetchError::invalid(label, "data is not an object")),
        None => Err(FetchError::invalid(label, "missing data object")),
    }
}
