//! # engine::format
//!
//! Display formatters for the dashboard tables and cards.
//!
//! Every formatter is total: it never panics and always returns a string.
//! Missing or non-finite numbers render as `"N/A"`, missing timestamps as `"-"`.
//! Dates are rendered in UTC so output does not depend on the host's locale
//! or time zone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub const NOT_AVAILABLE: &str = "N/A";
pub const NO_DATE: &str = "-";
pub const DEFAULT_PERCENT_DECIMALS: usize = 1;

/// Prices at or above this level are shown without decimals.
const WHOLE_PRICE_THRESHOLD: f64 = 50.0;

/// Epoch values at or above this are taken as milliseconds, not seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

const CRORE: f64 = 10_000_000.0;
const LAKH: f64 = 100_000.0;
const THOUSAND: f64 = 1_000.0;

#[inline]
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

// ─── Prices & Volumes ─────────────────────────────────────────────────────────

/// `>= 50` → no decimals, otherwise one decimal.
pub fn format_price(value: Option<f64>) -> String {
    match finite(value) {
        Some(v) if v >= WHOLE_PRICE_THRESHOLD => format!("{v:.0}"),
        Some(v) => format!("{v:.1}"),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Rounded, thousands-grouped integer, e.g. `1,234,567`.
pub fn format_volume(value: Option<f64>) -> String {
    let Some(v) = finite(value) else {
        return NOT_AVAILABLE.to_string();
    };

    let rounded = format!("{:.0}", v.abs());
    let mut grouped = String::with_capacity(rounded.len() + rounded.len() / 3 + 1);
    for (i, ch) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if v < 0.0 && rounded != "0" {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Compact volume for summary cards: `Cr` / `L` / `K` with one decimal.
///
/// The unit is picked after rounding, so `999.96` reads `1.0K`, not `1000`.
pub fn format_volume_compact(value: Option<f64>) -> String {
    let Some(v) = finite(value) else {
        return NOT_AVAILABLE.to_string();
    };

    let sign = if v < 0.0 { "-" } else { "" };
    let magnitude = v.abs();
    if magnitude.round() < THOUSAND {
        return format!("{v:.0}");
    }

    for (unit, suffix, next) in [(THOUSAND, "K", LAKH), (LAKH, "L", CRORE)] {
        let scaled = (magnitude / unit * 10.0).round() / 10.0;
        if scaled * unit < next {
            return format!("{sign}{scaled:.1}{suffix}");
        }
    }
    format!("{sign}{:.1}Cr", magnitude / CRORE)
}

/// Signed percentage with an explicit `+` for positive values.
pub fn format_percent(value: Option<f64>, decimals: usize) -> String {
    match finite(value) {
        Some(v) if v > 0.0 => format!("+{v:.decimals$}%"),
        Some(v) => format!("{v:.decimals$}%"),
        None => NOT_AVAILABLE.to_string(),
    }
}

// ─── Dates ────────────────────────────────────────────────────────────────────

/// `dd/mm/yy`
pub fn format_date_only(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.format("%d/%m/%y").to_string(),
        None => NO_DATE.to_string(),
    }
}

/// `dd/mm/yy HH:MM:SS`
pub fn format_date_time(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.format("%d/%m/%y %H:%M:%S").to_string(),
        None => NO_DATE.to_string(),
    }
}

/// Parse the timestamp shapes the feed and the REST API send.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DDTHH:MM:SS[.f]`
/// (both read as UTC), `YYYY-MM-DD`, and epoch seconds or milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(epoch) = s.parse::<f64>() {
        if !epoch.is_finite() || epoch < 0.0 {
            return None;
        }
        let millis = if epoch >= EPOCH_MILLIS_THRESHOLD {
            epoch
        } else {
            epoch * 1000.0
        };
        return DateTime::from_timestamp_millis(millis.round() as i64);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_price_precision_rule() {
        assert_eq!(format_price(Some(49.96)), "50.0");
        assert_eq!(format_price(Some(50.0)), "50");
        assert_eq!(format_price(Some(1234.56)), "1235");
        assert_eq!(format_price(Some(12.34)), "12.3");
        assert_eq!(format_price(Some(f64::NAN)), "N/A");
        assert_eq!(format_price(Some(f64::INFINITY)), "N/A");
        assert_eq!(format_price(None), "N/A");
    }

    #[test]
    fn test_format_volume_grouping() {
        assert_eq!(format_volume(Some(1_234_567.0)), "1,234,567");
        assert_eq!(format_volume(Some(999.4)), "999");
        assert_eq!(format_volume(Some(1000.0)), "1,000");
        assert_eq!(format_volume(Some(0.0)), "0");
        assert_eq!(format_volume(Some(-12_345.0)), "-12,345");
        assert_eq!(format_volume(None), "N/A");
    }

    #[test]
    fn test_format_volume_compact_promotes_after_rounding() {
        assert_eq!(format_volume_compact(Some(999.96)), "1.0K");
        assert_eq!(format_volume_compact(Some(950.0)), "950");
        assert_eq!(format_volume_compact(Some(99_999.0)), "1.0L");
        assert_eq!(format_volume_compact(Some(9_999_999.0)), "1.0Cr");
        assert_eq!(format_volume_compact(Some(99_940.0)), "99.9K");
    }

    #[test]
    fn test_format_volume_compact_thresholds() {
        assert_eq!(format_volume_compact(Some(25_000_000.0)), "2.5Cr");
        assert_eq!(format_volume_compact(Some(150_000.0)), "1.5L");
        assert_eq!(format_volume_compact(Some(1_500.0)), "1.5K");
        assert_eq!(format_volume_compact(Some(999.0)), "999");
        assert_eq!(format_volume_compact(Some(-2_500.0)), "-2.5K");
        assert_eq!(format_volume_compact(Some(f64::NAN)), "N/A");
    }

    #[test]
    fn test_format_percent_sign() {
        assert_eq!(format_percent(Some(0.5), DEFAULT_PERCENT_DECIMALS), "+0.5%");
        assert_eq!(format_percent(Some(-5.0), DEFAULT_PERCENT_DECIMALS), "-5.0%");
        assert_eq!(format_percent(Some(0.0), DEFAULT_PERCENT_DECIMALS), "0.0%");
        assert_eq!(format_percent(Some(3.756), 2), "+3.76%");
        assert_eq!(format_percent(None, 2), "N/A");
    }

    #[test]
    fn test_format_dates() {
        let ts = Utc.with_ymd_and_hms(2024, 10, 3, 9, 5, 7).unwrap();
        assert_eq!(format_date_only(Some(ts)), "03/10/24");
        assert_eq!(format_date_time(Some(ts)), "03/10/24 09:05:07");
        assert_eq!(format_date_only(None), "-");
        assert_eq!(format_date_time(parse_timestamp("not a date")), "-");
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 10, 3, 9, 5, 7).unwrap();
        assert_eq!(parse_timestamp("2024-10-03T09:05:07Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-10-03T14:35:07+05:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-10-03 09:05:07"), Some(expected));
        assert_eq!(parse_timestamp("1727946307"), Some(expected));
        assert_eq!(parse_timestamp("1727946307000"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-10-03"),
            Some(Utc.with_ymd_and_hms(2024, 10, 3, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("NaN"), None);
        assert_eq!(parse_timestamp("-5"), None);
    }
}
