//! # engine::validator
//!
//! **Tick Validator** — the gate every raw feed payload passes before it can
//! touch the history ring or the reconciler.
//!
//! ```text
//! raw JSON
//!     │
//!     ├─ [1] structured record?
//!     ├─ [2] symbol  ^[A-Za-z0-9_-]{1,20}$
//!     ├─ [3] numeric fields finite, >= 0 (quote quad all-or-nothing, > 0)
//!     ├─ [4] OHLC relation  high >= max(o, c), low <= min(o, c)
//!     └─ [5] timestamp parse, else ingestion time
//! ```
//!
//! Checks short-circuit on the first failure. A rejected tick is dropped; the
//! caller keeps the [`ValidationError`] as a per-symbol record. There is no
//! retry: the next feed push supersedes the rejected one.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::engine::format::parse_timestamp;
use crate::error::ValidationError;
use crate::models::{Quote, Tick};

const MAX_SYMBOL_LEN: usize = 20;

/// Symbol used for error records when the payload carries no usable symbol.
pub const UNKNOWN_SYMBOL: &str = "<unknown>";

/// Validate one raw feed record.
///
/// `now` is the ingestion time, substituted when the payload has no valid
/// timestamp.
pub fn validate_tick(raw: &Value, now: DateTime<Utc>) -> Result<Tick, ValidationError> {
    // ── [1] Structured record ─────────────────────────────────────────────────
    let obj = raw.as_object().ok_or(ValidationError::NotARecord)?;

    // ── [2] Symbol ────────────────────────────────────────────────────────────
    let symbol = validate_symbol(obj.get("symbol"))?;

    // ── [3] Numeric fields ────────────────────────────────────────────────────
    let ltp = non_negative(obj, "ltp", &["ltp", "price"])?;
    let close = non_negative(obj, "close", &["close"])?;
    let open = non_negative(obj, "open", &["open"])?;
    let high = non_negative(obj, "high", &["high"])?;
    let low = non_negative(obj, "low", &["low"])?;
    let volume = non_negative(obj, "volume", &["volume"])?;
    let quote = validate_quote(obj)?;

    // ── [4] OHLC relation ─────────────────────────────────────────────────────
    if let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, close) {
        if high < open.max(close) || low > open.min(close) {
            return Err(ValidationError::InconsistentOhlc { open, high, low, close });
        }
    }

    // ── [5] Timestamp ─────────────────────────────────────────────────────────
    let timestamp = ["timestamp", "time", "ts"]
        .iter()
        .find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
        .and_then(|v| match v {
            Value::String(s) => parse_timestamp(s),
            Value::Number(n) => parse_timestamp(&n.to_string()),
            _ => None,
        })
        .unwrap_or(now);

    Ok(Tick {
        symbol,
        timestamp,
        ltp,
        open,
        high,
        low,
        close,
        volume,
        quote,
    })
}

/// Best-effort symbol of a payload, for keying error records of rejected ticks.
pub fn symbol_hint(raw: &Value) -> String {
    raw.get("symbol")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.chars().take(MAX_SYMBOL_LEN * 2).collect::<String>())
        .unwrap_or_else(|| UNKNOWN_SYMBOL.to_string())
}

pub fn is_valid_symbol(symbol: &str) -> bool {
    (1..=MAX_SYMBOL_LEN).contains(&symbol.len())
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn validate_symbol(value: Option<&Value>) -> Result<String, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::MissingSymbol),
        Some(Value::String(s)) if s.is_empty() => Err(ValidationError::MissingSymbol),
        Some(Value::String(s)) if is_valid_symbol(s) => Ok(s.clone()),
        Some(other) => Err(ValidationError::InvalidSymbol(match other {
            Value::String(s) => s.clone(),
            v => v.to_string(),
        })),
    }
}

/// Every value `field` carries across its aliases, in alias order. Each one
/// must be a finite number; `null` counts as absent and numeric strings are
/// accepted. The first entry is the value the tick keeps.
fn read_numbers(
    obj: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<Vec<f64>, ValidationError> {
    aliases
        .iter()
        .filter_map(|key| obj.get(*key).filter(|v| !v.is_null()))
        .map(|value| parse_number(value, field))
        .collect()
}

fn parse_number(value: &Value, field: &'static str) -> Result<f64, ValidationError> {
    let number = match value {
        Value::Number(n) => n.as_f64().ok_or(ValidationError::NotNumeric { field })?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::NotNumeric { field })?,
        _ => return Err(ValidationError::NotNumeric { field }),
    };

    if !number.is_finite() {
        return Err(ValidationError::NonFinite { field });
    }
    Ok(number)
}

fn non_negative(
    obj: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<Option<f64>, ValidationError> {
    let values = read_numbers(obj, field, aliases)?;
    if let Some(&value) = values.iter().find(|v| **v < 0.0) {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(values.first().copied())
}

/// The quote quad is all-or-nothing; every member (under every alias) must be
/// strictly positive.
fn validate_quote(obj: &Map<String, Value>) -> Result<Option<Quote>, ValidationError> {
    let members = [
        ("bid", read_numbers(obj, "bid", &["bid"])?),
        ("ask", read_numbers(obj, "ask", &["ask"])?),
        ("bidQty", read_numbers(obj, "bidQty", &["bidQty", "bid_qty"])?),
        ("askQty", read_numbers(obj, "askQty", &["askQty", "ask_qty"])?),
    ];
    if members.iter().all(|(_, values)| values.is_empty()) {
        return Ok(None);
    }

    for (field, values) in &members {
        let field = *field;
        if values.is_empty() {
            return Err(ValidationError::IncompleteQuote { missing: field });
        }
        if let Some(&value) = values.iter().find(|v| **v <= 0.0) {
            return Err(ValidationError::NonPositiveQuote { field, value });
        }
    }

    match members.map(|(_, values)| values.first().copied()) {
        [Some(bid), Some(ask), Some(bid_qty), Some(ask_qty)] => {
            Ok(Some(Quote { bid, bid_qty, ask, ask_qty }))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 3, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_rejects_non_record() {
        assert_eq!(validate_tick(&json!(null), now()), Err(ValidationError::NotARecord));
        assert_eq!(validate_tick(&json!([1, 2]), now()), Err(ValidationError::NotARecord));
        assert_eq!(validate_tick(&json!("NIFTY"), now()), Err(ValidationError::NotARecord));
    }

    #[test]
    fn test_rejects_missing_symbol() {
        let raw = json!({ "ltp": 100.0 });
        assert_eq!(validate_tick(&raw, now()), Err(ValidationError::MissingSymbol));

        let raw = json!({ "symbol": "", "ltp": 100.0 });
        assert_eq!(validate_tick(&raw, now()), Err(ValidationError::MissingSymbol));
    }

    #[test]
    fn test_rejects_malformed_symbol() {
        for bad in ["NIFTY 50", "BANKNIFTY24OCT52000CE_X", "NIFTY/FUT"] {
            let raw = json!({ "symbol": bad });
            assert!(matches!(
                validate_tick(&raw, now()),
                Err(ValidationError::InvalidSymbol(_))
            ));
        }
        let raw = json!({ "symbol": 42 });
        assert_eq!(
            validate_tick(&raw, now()),
            Err(ValidationError::InvalidSymbol("42".into()))
        );
    }

    #[test]
    fn test_rejects_inconsistent_ohlc() {
        let raw = json!({ "symbol": "NIFTY", "open": 11.0, "high": 10.0, "low": 12.0, "close": 11.0 });
        assert_eq!(
            validate_tick(&raw, now()),
            Err(ValidationError::InconsistentOhlc { open: 11.0, high: 10.0, low: 12.0, close: 11.0 })
        );
    }

    #[test]
    fn test_accepts_consistent_ohlc() {
        let raw = json!({ "symbol": "NIFTY", "open": 100.0, "high": 105.0, "low": 98.0, "close": 104.0, "volume": 1200 });
        let tick = validate_tick(&raw, now()).unwrap();
        assert_eq!(tick.high, Some(105.0));
        assert_eq!(tick.volume, Some(1200.0));
        assert_eq!(tick.last_price(), Some(104.0));
    }

    #[test]
    fn test_accepts_quote_only_tick() {
        let raw = json!({ "symbol": "RELIANCE", "bid": 2900.5, "bidQty": 150, "ask": 2901.0, "askQty": 75 });
        let tick = validate_tick(&raw, now()).unwrap();
        assert_eq!(
            tick.quote,
            Some(Quote { bid: 2900.5, bid_qty: 150.0, ask: 2901.0, ask_qty: 75.0 })
        );
        assert_eq!(tick.open, None);
    }

    #[test]
    fn test_quote_must_be_complete_and_positive() {
        let raw = json!({ "symbol": "RELIANCE", "bid": 2900.5, "bidQty": 150 });
        assert_eq!(
            validate_tick(&raw, now()),
            Err(ValidationError::IncompleteQuote { missing: "ask" })
        );

        let raw = json!({ "symbol": "RELIANCE", "bid": 2900.5, "bid_qty": 0, "ask": 2901.0, "ask_qty": 75 });
        assert_eq!(
            validate_tick(&raw, now()),
            Err(ValidationError::NonPositiveQuote { field: "bidQty", value: 0.0 })
        );
    }

    #[test]
    fn test_rejects_negative_and_non_numeric_fields() {
        let raw = json!({ "symbol": "NIFTY", "ltp": -1.0 });
        assert_eq!(
            validate_tick(&raw, now()),
            Err(ValidationError::Negative { field: "ltp", value: -1.0 })
        );

        let raw = json!({ "symbol": "NIFTY", "volume": "lots" });
        assert_eq!(
            validate_tick(&raw, now()),
            Err(ValidationError::NotNumeric { field: "volume" })
        );

        let raw = json!({ "symbol": "NIFTY", "price": "NaN" });
        assert_eq!(
            validate_tick(&raw, now()),
            Err(ValidationError::NonFinite { field: "ltp" })
        );
    }

    #[test]
    fn test_every_alias_present_is_checked() {
        let raw = json!({ "symbol": "NIFTY", "ltp": 100, "price": -5 });
        assert_eq!(
            validate_tick(&raw, now()),
            Err(ValidationError::Negative { field: "ltp", value: -5.0 })
        );

        let raw = json!({ "symbol": "NIFTY", "ltp": 100, "price": "garbage" });
        assert_eq!(
            validate_tick(&raw, now()),
            Err(ValidationError::NotNumeric { field: "ltp" })
        );

        let raw = json!({
            "symbol": "RELIANCE",
            "bid": 2900.5, "bidQty": 5, "bid_qty": -3,
            "ask": 2901.0, "askQty": 75
        });
        assert_eq!(
            validate_tick(&raw, now()),
            Err(ValidationError::NonPositiveQuote { field: "bidQty", value: -3.0 })
        );
    }

    #[test]
    fn test_first_alias_supplies_the_value() {
        let raw = json!({ "symbol": "NIFTY", "ltp": 100, "price": 101 });
        assert_eq!(validate_tick(&raw, now()).unwrap().ltp, Some(100.0));

        let raw = json!({ "symbol": "NIFTY", "ltp": null, "price": 101 });
        assert_eq!(validate_tick(&raw, now()).unwrap().ltp, Some(101.0));
    }

    #[test]
    fn test_null_fields_are_absent() {
        let raw = json!({ "symbol": "NIFTY", "ltp": 101.5, "open": null, "bid": null });
        let tick = validate_tick(&raw, now()).unwrap();
        assert_eq!(tick.ltp, Some(101.5));
        assert_eq!(tick.open, None);
        assert_eq!(tick.quote, None);
    }

    #[test]
    fn test_timestamp_parsed_or_substituted() {
        let raw = json!({ "symbol": "NIFTY", "ltp": 1.0, "timestamp": "2024-10-03T09:15:00Z" });
        let tick = validate_tick(&raw, now()).unwrap();
        assert_eq!(tick.timestamp, Utc.with_ymd_and_hms(2024, 10, 3, 9, 15, 0).unwrap());

        let raw = json!({ "symbol": "NIFTY", "ltp": 1.0, "timestamp": "yesterday" });
        assert_eq!(validate_tick(&raw, now()).unwrap().timestamp, now());

        let raw = json!({ "symbol": "NIFTY", "ltp": 1.0 });
        assert_eq!(validate_tick(&raw, now()).unwrap().timestamp, now());
    }

    #[test]
    fn test_symbol_hint() {
        assert_eq!(symbol_hint(&json!({ "symbol": "NIFTY" })), "NIFTY");
        assert_eq!(symbol_hint(&json!({ "ltp": 1.0 })), UNKNOWN_SYMBOL);
        assert_eq!(symbol_hint(&json!(null)), UNKNOWN_SYMBOL);
    }
}
