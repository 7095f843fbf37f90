//! # models::tick
//!
//! Defines [`Tick`], one validated market update for one tradable symbol.
//!
//! A `Tick` is only ever produced by [`crate::engine::validator::validate_tick`];
//! everything downstream (history ring, reconciler, projections) can rely on
//! the invariants listed on the struct without re-checking them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single validated market update.
///
/// Invariants upheld by the validator:
/// * every price/volume field that is `Some` is finite and `>= 0`;
/// * the quote quad (`bid`, `bid_qty`, `ask`, `ask_qty`) is either fully
///   present with every member `> 0`, or fully absent;
/// * when `open`, `high`, `low` and `close` are all present,
///   `high >= max(open, close)` and `low <= min(open, close)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Exchange-specific trading symbol, e.g. `"NIFTY24OCT25000CE"`.
    pub symbol: String,

    /// When the update happened, or the ingestion time if the feed omitted it.
    pub timestamp: DateTime<Utc>,

    /// Last traded price (`ltp` or `price` on the wire).
    #[serde(default)]
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

    /// Best bid/ask. Present only as a complete [`Quote`].
    #[serde(default)]
    pub quote: Option<Quote>,
}

/// Top-of-book quote carried by the OHLC-quote tick variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub bid_qty: f64,
    pub ask: f64,
    pub ask_qty: f64,
}

impl Quote {
    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

impl Tick {
    /// The price a view should display for this tick: `ltp`, falling back to
    /// `close`, then to the quote mid.
    pub fn last_price(&self) -> Option<f64> {
        self.ltp
            .or(self.close)
            .or_else(|| self.quote.map(|q| q.mid()))
    }
}
