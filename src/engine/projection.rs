//! # engine::projection
//!
//! Read-side composition for the dashboard tables: derived metrics are
//! computed from `current_view()` at read time and paired with their display
//! strings. Nothing here is stored.
//!
//! * [`option_chain`]: covered-call chain rows (one per strike + side).
//! * [`spreads`]: arbitrage rows (spot / near / next / far legs) and the
//!   average-gap summary cards.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::format::{
    format_date_time, format_percent, format_price, format_volume, DEFAULT_PERCENT_DECIMALS,
};
use crate::engine::metrics::{average_defined, Gap, LegPrices, OptionMetrics, SpreadGaps};
use crate::models::{EntityKey, EntityView, OptionSide, Provenance, Slot};

// ─── Option Chain ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainRow {
    pub strike: f64,
    pub side: OptionSide,
    pub symbol: String,
    pub premium: Option<f64>,
    pub volume: Option<f64>,
    pub provenance: Provenance,
    pub timestamp: DateTime<Utc>,
    /// Seconds since `timestamp`, as of the read.
    pub age_secs: i64,
    #[serde(flatten)]
    pub metrics: OptionMetrics,
    pub display: ChainDisplay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainDisplay {
    pub premium: String,
    pub volume: String,
    pub otm: String,
    pub premium_pct: String,
    pub monthly_premium_pct: String,
    pub updated: String,
}

/// One row per `(strike, CE|PE)` snapshot, sorted by strike then side.
/// Entities whose key is not a strike are skipped.
pub fn option_chain(
    view: &BTreeMap<EntityKey, EntityView>,
    underlying: Option<f64>,
    days_to_expiry: Option<i64>,
    atm_threshold_pct: f64,
    now: DateTime<Utc>,
) -> Vec<ChainRow> {
    let mut rows: Vec<ChainRow> = view
        .iter()
        .filter_map(|(key, entity)| key.as_strike().map(|strike| (strike, entity)))
        .flat_map(|(strike, entity)| {
            entity.slots.iter().filter_map(move |(slot, snap)| {
                let side = slot.option_side()?;
                let metrics = OptionMetrics::compute(
                    underlying,
                    Some(strike),
                    side,
                    snap.price,
                    days_to_expiry,
                    atm_threshold_pct,
                );
                Some(ChainRow {
                    strike,
                    side,
                    symbol: snap.symbol.clone(),
                    premium: snap.price,
                    volume: snap.volume,
                    provenance: snap.provenance,
                    timestamp: snap.timestamp,
                    age_secs: snap.age_secs(now),
                    display: ChainDisplay {
                        premium: format_price(snap.price),
                        volume: format_volume(snap.volume),
                        otm: format_percent(metrics.otm_pct, DEFAULT_PERCENT_DECIMALS),
                        premium_pct: format_percent(metrics.premium_pct, 2),
                        monthly_premium_pct: format_percent(metrics.monthly_premium_pct, 2),
                        updated: format_date_time(Some(snap.timestamp)),
                    },
                    metrics,
                })
            })
        })
        .collect();

    rows.sort_by(|a, b| a.strike.total_cmp(&b.strike).then(a.side.cmp(&b.side)));
    rows
}

// ─── Spreads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadRow {
    pub key: EntityKey,
    pub mode: &'static str,
    pub spot: Option<f64>,
    pub near: Option<f64>,
    pub next: Option<f64>,
    pub far: Option<f64>,
    /// Age of the stalest leg present; `None` when no leg has a snapshot.
    pub age_secs: Option<i64>,
    pub gaps: SpreadGaps,
    pub display: SpreadDisplay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadDisplay {
    pub spot: String,
    pub near: String,
    pub next: String,
    pub far: String,
    pub near_next: String,
    pub next_far: String,
    pub far_near: String,
}

/// Averages for the summary cards; rows with an undefined gap are excluded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadSummary {
    pub rows: usize,
    pub avg_near_next_pct: Option<f64>,
    pub avg_next_far_pct: Option<f64>,
    pub avg_far_near_pct: Option<f64>,
    pub display: SummaryDisplay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryDisplay {
    pub avg_near_next_pct: String,
    pub avg_next_far_pct: String,
    pub avg_far_near_pct: String,
}

fn gap_pct(gap: Option<Gap>) -> Option<f64> {
    gap.map(|g| g.percentage)
}

/// One row per entity holding at least one futures leg.
pub fn spreads(view: &BTreeMap<EntityKey, EntityView>, now: DateTime<Utc>) -> Vec<SpreadRow> {
    view.iter()
        .filter(|(_, entity)| {
            [Slot::Near, Slot::Next, Slot::Far]
                .iter()
                .any(|slot| entity.slots.contains_key(slot))
        })
        .map(|(key, entity)| {
            let legs = LegPrices {
                spot: entity.price(Slot::Spot),
                near: entity.price(Slot::Near),
                next: entity.price(Slot::Next),
                far: entity.price(Slot::Far),
            };
            let gaps = SpreadGaps::compute(legs);
            let age_secs = [Slot::Spot, Slot::Near, Slot::Next, Slot::Far]
                .into_iter()
                .filter_map(|slot| entity.get(slot).map(|snap| snap.age_secs(now)))
                .max();
            SpreadRow {
                key: key.clone(),
                mode: entity.mode(),
                spot: legs.spot,
                near: legs.near,
                next: legs.next,
                far: legs.far,
                age_secs,
                display: SpreadDisplay {
                    spot: format_price(legs.spot),
                    near: format_price(legs.near),
                    next: format_price(legs.next),
                    far: format_price(legs.far),
                    near_next: format_percent(gap_pct(gaps.near_next), 2),
                    next_far: format_percent(gap_pct(gaps.next_far), 2),
                    far_near: format_percent(gap_pct(gaps.far_near), 2),
                },
                gaps,
            }
        })
        .collect()
}

pub fn spread_summary(rows: &[SpreadRow]) -> SpreadSummary {
    let avg_near_next_pct = average_defined(rows.iter().map(|r| gap_pct(r.gaps.near_next)));
    let avg_next_far_pct = average_defined(rows.iter().map(|r| gap_pct(r.gaps.next_far)));
    let avg_far_near_pct = average_defined(rows.iter().map(|r| gap_pct(r.gaps.far_near)));

    SpreadSummary {
        rows: rows.len(),
        avg_near_next_pct,
        avg_next_far_pct,
        avg_far_near_pct,
        display: SummaryDisplay {
            avg_near_next_pct: format_percent(avg_near_next_pct, 2),
            avg_next_far_pct: format_percent(avg_next_far_pct, 2),
            avg_far_near_pct: format_percent(avg_far_near_pct, 2),
        },
    }
}
