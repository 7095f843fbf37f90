//! # models::row
//!
//! [`HistoricalRow`] — one record of a bulk page returned by the REST rows
//! collaborator. Field names follow the upstream API (snake_case with a few
//! camelCase aliases); everything is optional because different endpoints
//! (option chain, futures legs, OHLC history) fill different subsets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::format::parse_timestamp;
use crate::models::snapshot::{EntityKey, Provenance, Slot, Snapshot};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRow {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub underlying: Option<String>,

    #[serde(default, alias = "strike_price", alias = "strikePrice")]
    pub strike: Option<f64>,
    #[serde(default, alias = "side", alias = "optionType")]
    pub option_type: Option<String>,
    /// Futures leg designator (`NEAR` / `NEXT` / `FAR` / `SPOT`).
    #[serde(default)]
    pub leg: Option<String>,

    #[serde(default)]
    pub premium: Option<f64>,
    #[serde(default, alias = "price")]
    pub ltp: Option<f64>,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,

    /// Server-computed metrics; kept for display parity, never trusted over
    /// the locally derived values.
    #[serde(default)]
    pub otm: Option<f64>,
    #[serde(default)]
    pub premium_percentage: Option<f64>,

    /// ISO-8601 string or epoch number.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

impl HistoricalRow {
    /// Resolve which `(key, slot)` this row seeds.
    ///
    /// * strike + option type → strike key, `CE`/`PE` slot;
    /// * otherwise the underlying (or symbol) key, with the `leg` slot or `SPOT`.
    pub fn entity(&self) -> Option<(EntityKey, Slot)> {
        if let (Some(strike), Some(side)) = (self.strike, self.option_type.as_deref()) {
            if strike.is_finite() {
                let slot = Slot::parse(side)?;
                return Some((EntityKey::strike(strike), slot));
            }
        }

        let name = self
            .underlying
            .as_deref()
            .or(self.symbol.as_deref())
            .filter(|s| !s.trim().is_empty())?;
        let slot = match self.leg.as_deref() {
            Some(leg) => Slot::parse(leg)?,
            None => Slot::Spot,
        };
        Some((EntityKey::symbol(name.trim()), slot))
    }

    /// The display price carried by the row.
    pub fn price(&self) -> Option<f64> {
        self.premium
            .or(self.ltp)
            .or(self.close)
            .filter(|v| v.is_finite())
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.timestamp.as_ref()? {
            serde_json::Value::String(s) => parse_timestamp(s),
            serde_json::Value::Number(n) => parse_timestamp(&n.to_string()),
            _ => None,
        }
    }

    /// Build the `HISTORICAL` snapshot for this row; `now` stands in for a
    /// missing or unparseable timestamp.
    pub fn to_snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        Snapshot {
            symbol: self
                .symbol
                .clone()
                .or_else(|| self.underlying.clone())
                .unwrap_or_default(),
            provenance: Provenance::Historical,
            timestamp: self.parsed_timestamp().unwrap_or(now),
            price: self.price(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            quote: None,
        }
    }
}
