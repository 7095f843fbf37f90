//! # config
//!
//! Service configuration read from environment variables (after `.env` has
//! been loaded by `main`).
//!
//! | Variable             | Default        | Description                              |
//! |----------------------|----------------|------------------------------------------|
//! | `BIND_ADDR`          | `0.0.0.0:3000` | Address Axum listens on                  |
//! | `HISTORY_CAPACITY`   | `5`            | Ticks kept per symbol                    |
//! | `ATM_THRESHOLD_PCT`  | `1.0`          | ATM band for the option chain            |
//! | `ROWS_URL`           | unset          | Bulk rows endpoint used by `/api/view/seed` |
//! | `ROWS_TIMEOUT_SECS`  | `5`            | Timeout for one rows page                |
//! | `BROADCAST_CAPACITY` | `256`          | WebSocket event buffer                   |

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::engine::history::DEFAULT_HISTORY_CAPACITY;
use crate::engine::metrics::DEFAULT_ATM_THRESHOLD_PCT;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_ROWS_TIMEOUT_SECS: u64 = 5;
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr:          SocketAddr,
    pub history_capacity:   usize,
    pub atm_threshold_pct:  f64,
    /// `None` = seeding only from request bodies.
    pub rows_url:           Option<String>,
    pub rows_timeout:       Duration,
    pub broadcast_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr: SocketAddr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be a socket address, e.g. 0.0.0.0:3000")?;

        let atm_threshold_pct = match lookup("ATM_THRESHOLD_PCT") {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .context("ATM_THRESHOLD_PCT must be a number")?,
            None => DEFAULT_ATM_THRESHOLD_PCT,
        };
        if !atm_threshold_pct.is_finite() || atm_threshold_pct < 0.0 {
            bail!("ATM_THRESHOLD_PCT must be a finite, non-negative number");
        }

        Ok(Self {
            bind_addr,
            history_capacity:   parse_or(&lookup, "HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY).max(1),
            atm_threshold_pct,
            rows_url:           lookup("ROWS_URL").filter(|url| !url.trim().is_empty()),
            rows_timeout:       Duration::from_secs(parse_or(&lookup, "ROWS_TIMEOUT_SECS", DEFAULT_ROWS_TIMEOUT_SECS)),
            broadcast_capacity: parse_or(&lookup, "BROADCAST_CAPACITY", DEFAULT_BROADCAST_CAPACITY).max(1),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr:          SocketAddr::from(([0, 0, 0, 0], 3000)),
            history_capacity:   DEFAULT_HISTORY_CAPACITY,
            atm_threshold_pct:  DEFAULT_ATM_THRESHOLD_PCT,
            rows_url:           None,
            rows_timeout:       Duration::from_secs(DEFAULT_ROWS_TIMEOUT_SECS),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(make_lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(config.history_capacity, 5);
        assert_eq!(config.atm_threshold_pct, 1.0);
        assert_eq!(config.rows_url, None);
        assert_eq!(config.rows_timeout, Duration::from_secs(5));
        assert_eq!(config.broadcast_capacity, 256);
    }

    #[test]
    fn test_overrides_and_lenient_counts() {
        let config = Config::from_lookup(make_lookup(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("HISTORY_CAPACITY", "0"),
            ("ATM_THRESHOLD_PCT", "0.5"),
            ("ROWS_URL", "http://localhost:9000/api/rows"),
            ("ROWS_TIMEOUT_SECS", "not-a-number"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.history_capacity, 1);
        assert_eq!(config.atm_threshold_pct, 0.5);
        assert_eq!(config.rows_url.as_deref(), Some("http://localhost:9000/api/rows"));
        assert_eq!(config.rows_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_bind_addr_and_threshold_fail() {
        assert!(Config::from_lookup(make_lookup(&[("BIND_ADDR", "nowhere")])).is_err());
        assert!(Config::from_lookup(make_lookup(&[("ATM_THRESHOLD_PCT", "-1")])).is_err());
        assert!(Config::from_lookup(make_lookup(&[("ATM_THRESHOLD_PCT", "abc")])).is_err());
    }
}
