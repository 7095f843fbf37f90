//! # engine::metrics
//!
//! **Derived Metrics** — gap / OTM% / premium% / monthly premium% / ATM.
//!
//! All functions are pure and take already-validated prices. An undefined
//! ratio (zero, missing or non-finite input) yields `None`, never `NaN`.
//!
//! ## Missing-leg policy
//!
//! Gaps are null-propagating: if any of `a`, `b` or `base` is missing, zero or
//! non-finite, the whole [`Gap`] is `None`. Aggregates go through
//! [`average_defined`], which excludes undefined rows from both the sum and
//! the count, so a missing leg never drags an average towards zero.

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::OptionSide;

/// Default `|underlying - strike| / underlying` band (in %) treated as ATM.
pub const DEFAULT_ATM_THRESHOLD_PCT: f64 = 1.0;

/// Premiums are normalised to this many days for the monthly figure.
const MONTH_DAYS: f64 = 30.0;

#[inline]
fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != 0.0)
}

#[inline]
fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

// ─── Gap ──────────────────────────────────────────────────────────────────────

/// Price difference between two legs, absolute and relative to a base price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Gap {
    pub amount: f64,
    pub percentage: f64,
}

/// `a - b` and `(a - b) / base * 100`.
pub fn gap(a: Option<f64>, b: Option<f64>, base: Option<f64>) -> Option<Gap> {
    let (a, b, base) = (usable(a)?, usable(b)?, usable(base)?);
    let amount = a - b;
    Some(Gap {
        amount,
        percentage: amount / base * 100.0,
    })
}

/// Prices of the legs shown in one arbitrage row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LegPrices {
    pub spot: Option<f64>,
    pub near: Option<f64>,
    pub next: Option<f64>,
    pub far: Option<f64>,
}

/// The three leg-pair gaps, each relative to the spot price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SpreadGaps {
    pub near_next: Option<Gap>,
    pub next_far: Option<Gap>,
    pub far_near: Option<Gap>,
}

impl SpreadGaps {
    pub fn compute(legs: LegPrices) -> Self {
        Self {
            near_next: gap(legs.next, legs.near, legs.spot),
            next_far: gap(legs.far, legs.next, legs.spot),
            far_near: gap(legs.far, legs.near, legs.spot),
        }
    }
}

/// Mean over the defined values only; `None` when nothing is defined.
pub fn average_defined<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .filter_map(present)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    (count > 0).then(|| sum / count as f64)
}

// ─── Options ──────────────────────────────────────────────────────────────────

/// Distance of the strike from the underlying, signed by side.
///
/// CE: `(strike - underlying) / underlying * 100`;
/// PE: `(underlying - strike) / underlying * 100`.
pub fn otm_percent(underlying: Option<f64>, strike: Option<f64>, side: OptionSide) -> Option<f64> {
    let underlying = usable(underlying)?;
    let strike = present(strike)?;
    let distance = match side {
        OptionSide::Ce => strike - underlying,
        OptionSide::Pe => underlying - strike,
    };
    Some(distance / underlying * 100.0)
}

/// `premium / underlying * 100`.
pub fn premium_percent(premium: Option<f64>, underlying: Option<f64>) -> Option<f64> {
    let underlying = usable(underlying)?;
    Some(present(premium)? / underlying * 100.0)
}

/// Premium percentage normalised to a 30-day month.
pub fn monthly_premium_percent(premium_pct: Option<f64>, days_to_expiry: Option<i64>) -> Option<f64> {
    let days = days_to_expiry.filter(|d| *d > 0)?;
    Some(present(premium_pct)? * MONTH_DAYS / days as f64)
}

/// `|underlying - strike| / underlying * 100` within `threshold_pct`.
///
/// The band is inclusive: a strike exactly `threshold_pct` away counts as ATM.
pub fn is_atm(underlying: Option<f64>, strike: Option<f64>, threshold_pct: f64) -> bool {
    match (usable(underlying), present(strike)) {
        (Some(u), Some(s)) => (u - s).abs() / u * 100.0 <= threshold_pct,
        _ => false,
    }
}

/// Calendar days from `today` until `expiry` (negative once expired).
pub fn days_to_expiry(expiry: NaiveDate, today: NaiveDate) -> i64 {
    (expiry - today).num_days()
}

/// Everything a covered-call chain row derives from one option quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptionMetrics {
    pub otm_pct: Option<f64>,
    pub premium_pct: Option<f64>,
    pub monthly_premium_pct: Option<f64>,
    pub is_atm: bool,
}

impl OptionMetrics {
    pub fn compute(
        underlying: Option<f64>,
        strike: Option<f64>,
        side: OptionSide,
        premium: Option<f64>,
        days_to_expiry: Option<i64>,
        atm_threshold_pct: f64,
    ) -> Self {
        let premium_pct = premium_percent(premium, underlying);
        Self {
            otm_pct: otm_percent(underlying, strike, side),
            premium_pct,
            monthly_premium_pct: monthly_premium_percent(premium_pct, days_to_expiry),
            is_atm: is_atm(underlying, strike, atm_threshold_pct),
        }
    }
}
