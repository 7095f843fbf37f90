//! # models::snapshot
//!
//! The rows a view renders: an [`EntityKey`] (one strike, or one plain
//! symbol) holding at most one [`Snapshot`] per [`Slot`].
//!
//! Each snapshot is tagged with its [`Provenance`] so the dashboard can badge
//! rows as `HISTORICAL` or `LIVE`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::tick::{Quote, Tick};

// ─── OptionSide ───────────────────────────────────────────────────────────────

/// Call / put designator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionSide {
    #[serde(rename = "CE")]
    Ce,
    #[serde(rename = "PE")]
    Pe,
}

impl OptionSide {
    /// Parse the exchange designator (`"CE"` / `"PE"`, also `"CALL"` / `"PUT"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CE" | "CALL" | "C" => Some(OptionSide::Ce),
            "PE" | "PUT" | "P" => Some(OptionSide::Pe),
            _ => None,
        }
    }
}

// ─── Slot ─────────────────────────────────────────────────────────────────────

/// Position of a snapshot inside one entity.
///
/// Option chains use `Ce`/`Pe` under a strike key; arbitrage views use
/// `Spot`/`Near`/`Next`/`Far` legs under the underlying's symbol key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Slot {
    Ce,
    Pe,
    Spot,
    Near,
    Next,
    Far,
}

impl Slot {
    pub fn option_side(self) -> Option<OptionSide> {
        match self {
            Slot::Ce => Some(OptionSide::Ce),
            Slot::Pe => Some(OptionSide::Pe),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if let Some(side) = OptionSide::parse(s) {
            return Some(side.into());
        }
        match s.trim().to_ascii_uppercase().as_str() {
            "SPOT" | "CASH" | "UNDERLYING" => Some(Slot::Spot),
            "NEAR" => Some(Slot::Near),
            "NEXT" => Some(Slot::Next),
            "FAR" => Some(Slot::Far),
            _ => None,
        }
    }
}

impl From<OptionSide> for Slot {
    fn from(side: OptionSide) -> Self {
        match side {
            OptionSide::Ce => Slot::Ce,
            OptionSide::Pe => Slot::Pe,
        }
    }
}

// ─── EntityKey ────────────────────────────────────────────────────────────────

/// Key of one logical row: a strike (`"25000"`, `"187.5"`) or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

const WHOLE_STRIKE_LIMIT: f64 = 1e15;

impl EntityKey {
    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// Key for an option strike. Whole strikes drop the fractional part so
    /// `25000.0` and `25000` resolve to the same row.
    pub fn strike(strike: f64) -> Self {
        // past 1e15 an f64 no longer carries a fractional part, and the cast
        // would saturate at i64::MAX
        if strike.fract() == 0.0 && strike.abs() < WHOLE_STRIKE_LIMIT {
            Self(format!("{}", strike as i64))
        } else {
            Self(format!("{strike}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The strike price this key denotes, if it is numeric.
    pub fn as_strike(&self) -> Option<f64> {
        self.0.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Provenance ───────────────────────────────────────────────────────────────

/// Where a slot's current value came from.
///
/// Transitions: `Empty → Historical` (seed), `Empty | Historical → Live`
/// (live tick), `Live → Live`. A reset sends every slot back to `Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    Empty,
    Historical,
    Live,
}

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// Last known state of one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: String,
    pub provenance: Provenance,
    pub timestamp: DateTime<Utc>,

    /// Display price: LTP for live ticks, premium/price for seeded rows.
    pub price: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub quote: Option<Quote>,
}

impl Snapshot {
    pub fn from_live(tick: &Tick) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            provenance: Provenance::Live,
            timestamp: tick.timestamp,
            price: tick.last_price(),
            open: tick.open,
            high: tick.high,
            low: tick.low,
            close: tick.close,
            volume: tick.volume,
            quote: tick.quote,
        }
    }

    /// Seconds since this snapshot's timestamp; drives staleness badges.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_seconds().max(0)
    }
}

/// Read-only projection of one entity, as returned by `current_view()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityView {
    /// `true` until a live tick has been applied to this key since the last reset.
    pub historical_only: bool,
    pub slots: BTreeMap<Slot, Snapshot>,
}

impl EntityView {
    pub fn get(&self, slot: Slot) -> Option<&Snapshot> {
        self.slots.get(&slot)
    }

    pub fn price(&self, slot: Slot) -> Option<f64> {
        self.get(slot).and_then(|s| s.price)
    }

    /// Badge text used by the dashboard tables.
    pub fn mode(&self) -> &'static str {
        if self.historical_only {
            "HISTORICAL"
        } else {
            "LIVE"
        }
    }
}
