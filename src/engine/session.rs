//! # engine::session
//!
//! [`FeedSession`] holds everything one open view owns: the reconciler (and its
//! tick history), the subscribed symbol set, the selected grouping, the
//! symbol → entity table and the per-symbol rejection records.
//!
//! The live feed collaborator talks to it through exactly three synchronous
//! entry points: [`FeedSession::on_tick`], [`FeedSession::on_subscribed`] and
//! [`FeedSession::on_unsubscribed`]. None of them block or suspend; the host
//! calls them from whatever event loop delivers feed events.
//!
//! Feed disconnects are not an input here at all, so a dropped feed can never
//! clear state: the view keeps showing the last known values.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::history::TickHistory;
use crate::engine::reconciler::{ApplyOutcome, KeyResolver, Reconciler, SymbolTable};
use crate::engine::validator::{symbol_hint, validate_tick, UNKNOWN_SYMBOL};
use crate::error::ValidationError;
use crate::models::{EntityKey, EntityView, HistoricalRow, Slot};

// ─── Records & Reports ────────────────────────────────────────────────────────

/// Why the last tick for a symbol was dropped, for UI banners.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickError {
    /// Symbol the rejected payload carried (may differ from the record key).
    pub symbol: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedTick {
    pub symbol: String,
    pub key: EntityKey,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedTick {
    pub symbol: String,
    pub message: String,
    #[serde(skip)]
    pub error: ValidationError,
}

/// What one `on_tick` call did with its record(s).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub applied: Vec<AppliedTick>,
    pub rejected: Vec<RejectedTick>,
    /// Valid ticks for symbols outside the subscribed set.
    pub ignored: usize,
    /// Valid, subscribed ticks the resolver could not map to an entity.
    pub unresolved: usize,
}

impl TickReport {
    pub fn accepted(&self) -> usize {
        self.applied.len() + self.unresolved
    }
}

// ─── FeedSession ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FeedSession {
    id: Uuid,
    reconciler: Reconciler,
    resolver: SymbolTable,
    subscribed: BTreeSet<String>,
    group: Option<String>,
    errors: BTreeMap<String, TickError>,
}

impl FeedSession {
    pub fn new(history_capacity: usize) -> Self {
        let id = Uuid::new_v4();
        info!(session_id = %id, history_capacity, "Feed session created");
        Self {
            id,
            reconciler: Reconciler::new(history_capacity),
            resolver: SymbolTable::default(),
            subscribed: BTreeSet::new(),
            group: None,
            errors: BTreeMap::new(),
        }
    }

    // ── Feed entry points ─────────────────────────────────────────────────────

    /// A feed push: one tick record, or an array of them (bulk event).
    pub fn on_tick(&mut self, raw: &Value) -> TickReport {
        self.on_tick_at(raw, Utc::now())
    }

    /// [`Self::on_tick`] with an explicit ingestion time.
    pub fn on_tick_at(&mut self, raw: &Value, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        match raw {
            Value::Array(items) => {
                for item in items {
                    self.ingest_one(item, now, &mut report);
                }
            }
            single => self.ingest_one(single, now, &mut report),
        }

        debug!(
            session_id = %self.id,
            applied    = report.applied.len(),
            rejected   = report.rejected.len(),
            ignored    = report.ignored,
            "Feed push processed"
        );
        report
    }

    /// The feed acknowledged a subscription. Adds to the subscribed set and
    /// returns how many symbols were new. Idempotent.
    pub fn on_subscribed<I, S>(&mut self, symbols: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let added = symbols
            .into_iter()
            .map(Into::into)
            .filter(|symbol| self.subscribed.insert(symbol.clone()))
            .count();

        if added > 0 {
            info!(session_id = %self.id, added, total = self.subscribed.len(), "Symbols subscribed");
        }
        added
    }

    /// The feed dropped symbols: clear their history, reset their slots and
    /// forget their error records. Idempotent.
    pub fn on_unsubscribed<I, S>(&mut self, symbols: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = 0;
        for symbol in symbols {
            let symbol = symbol.as_ref();
            if self.subscribed.remove(symbol) {
                removed += 1;
            }
            self.reconciler.history_mut().clear(symbol);
            if let Some((key, slot)) = self.resolver.resolve(symbol) {
                self.reconciler.reset_slot(&key, slot);
            }
            self.resolver.forget(symbol);
            self.errors.remove(symbol);
        }

        if removed > 0 {
            info!(session_id = %self.id, removed, total = self.subscribed.len(), "Symbols unsubscribed");
        }
        removed
    }

    // ── Host controls ─────────────────────────────────────────────────────────

    /// Replace the whole subscribed set. A different set resets the view.
    /// Returns `true` when a reset happened.
    pub fn replace_subscriptions<I, S>(&mut self, symbols: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: BTreeSet<String> = symbols.into_iter().map(Into::into).collect();
        if next == self.subscribed {
            return false;
        }
        self.reset();
        self.subscribed = next;
        self.prune_symbol_table();
        info!(session_id = %self.id, total = self.subscribed.len(), "Subscription set replaced");
        true
    }

    /// Select the grouping the view shows (e.g. an expiry date). Switching to a
    /// different grouping resets the view; returns `true` when that happened.
    pub fn select_group(&mut self, group: impl Into<String>) -> bool {
        let group = group.into();
        if self.group.as_deref() == Some(group.as_str()) {
            return false;
        }
        let previous = self.group.replace(group);
        self.reset();
        self.prune_symbol_table();
        info!(session_id = %self.id, ?previous, group = ?self.group, "Grouping changed — view reset");
        true
    }

    /// Seed from a bulk REST page. Row symbols are registered in the entity
    /// table so later live ticks land on the same `(key, slot)`.
    pub fn seed_historical(&mut self, rows: &[HistoricalRow], now: DateTime<Utc>) -> usize {
        for row in rows {
            if let (Some(symbol), Some((key, slot))) = (row.symbol.as_deref(), row.entity()) {
                self.resolver.register(symbol, key, slot);
            }
        }
        let filled = self.reconciler.seed_historical(rows, now);
        info!(session_id = %self.id, rows = rows.len(), filled, "Historical rows seeded");
        filled
    }

    pub fn register(&mut self, symbol: impl Into<String>, key: EntityKey, slot: Slot) {
        self.resolver.register(symbol, key, slot);
    }

    /// `* → EMPTY`: drop snapshots, tick history and error records. The
    /// subscribed set, grouping and entity table are kept; grouping and
    /// subscription-set changes additionally prune the entity table.
    pub fn reset(&mut self) {
        self.reconciler.reset();
        self.errors.clear();
        debug!(session_id = %self.id, "Session state reset");
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current_view(&self) -> BTreeMap<EntityKey, EntityView> {
        self.reconciler.current_view()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn history(&self) -> &TickHistory {
        self.reconciler.history()
    }

    pub fn errors(&self) -> &BTreeMap<String, TickError> {
        &self.errors
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn subscribed(&self) -> impl Iterator<Item = &str> {
        self.subscribed.iter().map(String::as_str)
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.resolver
    }

    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.subscribed.contains(symbol)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Drop entity mappings for symbols outside the subscribed set.
    fn prune_symbol_table(&mut self) {
        let before = self.resolver.len();
        let subscribed = &self.subscribed;
        self.resolver.retain(|symbol| subscribed.contains(symbol));
        let dropped = before - self.resolver.len();
        if dropped > 0 {
            debug!(session_id = %self.id, dropped, "Symbol mappings pruned");
        }
    }

    fn ingest_one(&mut self, raw: &Value, now: DateTime<Utc>, report: &mut TickReport) {
        let tick = match validate_tick(raw, now) {
            Ok(tick) => tick,
            Err(error) => {
                let symbol = symbol_hint(raw);
                warn!(session_id = %self.id, %symbol, %error, "Tick rejected");
                // Keyed by symbol only while subscribed; every other rejection
                // shares one slot so the map stays bounded by the subscription set.
                let record_key = if self.subscribed.contains(&symbol) {
                    symbol.clone()
                } else {
                    UNKNOWN_SYMBOL.to_string()
                };
                self.errors.insert(
                    record_key,
                    TickError {
                        symbol:    symbol.clone(),
                        message:   error.to_string(),
                        timestamp: now,
                    },
                );
                report.rejected.push(RejectedTick {
                    symbol,
                    message: error.to_string(),
                    error,
                });
                return;
            }
        };

        if !self.subscribed.contains(&tick.symbol) {
            debug!(symbol = %tick.symbol, "Tick for unsubscribed symbol — ignored");
            report.ignored += 1;
            return;
        }

        let symbol = tick.symbol.clone();
        match self.reconciler.record(tick, &self.resolver) {
            ApplyOutcome::Applied { key, slot, .. } => {
                self.errors.remove(&symbol);
                report.applied.push(AppliedTick { symbol, key, slot });
            }
            ApplyOutcome::Unresolved => report.unresolved += 1,
        }
    }
}

impl Default for FeedSession {
    fn default() -> Self {
        Self::new(crate::engine::history::DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::metrics::{gap, otm_percent, premium_percent, monthly_premium_percent};
    use crate::models::{OptionSide, Provenance};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 3, 10, 0, 0).unwrap()
    }

    fn make_session() -> FeedSession {
        let mut session = FeedSession::new(5);
        session.on_subscribed(["NIFTY", "NIFTY25000CE", "NIFTY25000PE"]);
        session
    }

    fn option_rows() -> Vec<HistoricalRow> {
        serde_json::from_value(json!([
            { "symbol": "NIFTY25000CE", "strike": 25000, "option_type": "CE", "premium": 120.0 },
            { "symbol": "NIFTY25000PE", "strike": 25000, "option_type": "PE", "premium": 95.0 }
        ]))
        .unwrap()
    }

    #[test]
    fn test_single_and_bulk_pushes() {
        let mut session = make_session();
        let report = session.on_tick_at(&json!({ "symbol": "NIFTY", "ltp": 25010.0 }), now());
        assert_eq!(report.applied.len(), 1);

        let report = session.on_tick_at(
            &json!([
                { "symbol": "NIFTY", "ltp": 25012.0 },
                { "symbol": "NIFTY", "ltp": -1.0 },
                { "symbol": "SENSEX", "ltp": 81000.0 }
            ]),
            now(),
        );
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.accepted(), 1);
        assert_eq!(session.history().len("NIFTY"), 2);
    }

    #[test]
    fn test_rejection_is_recorded_per_symbol_and_cleared_by_next_good_tick() {
        let mut session = make_session();
        session.on_tick_at(
            &json!({ "symbol": "NIFTY", "open": 11.0, "high": 10.0, "low": 12.0, "close": 11.0 }),
            now(),
        );
        let record = &session.errors()["NIFTY"];
        assert!(record.message.contains("inconsistent OHLC"));
        assert_eq!(record.timestamp, now());
        assert!(session.current_view().is_empty());

        session.on_tick_at(&json!({ "ltp": 3.0 }), now());
        assert!(session.errors().contains_key(UNKNOWN_SYMBOL));

        session.on_tick_at(&json!({ "symbol": "NIFTY", "ltp": 25000.0 }), now());
        assert!(!session.errors().contains_key("NIFTY"));
    }

    #[test]
    fn test_rejections_for_unsubscribed_symbols_share_one_record() {
        let mut session = make_session();
        for i in 0..5000 {
            session.on_tick_at(&json!({ "symbol": format!("JUNK{i}"), "ltp": -1.0 }), now());
        }
        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[UNKNOWN_SYMBOL].symbol, "JUNK4999");

        session.on_tick_at(&json!({ "symbol": "NIFTY25000CE", "ltp": -1.0 }), now());
        assert_eq!(session.errors().len(), 2);
        assert_eq!(session.errors()["NIFTY25000CE"].symbol, "NIFTY25000CE");
    }

    #[test]
    fn test_seed_then_live_upgrades_and_reseed_keeps_live() {
        let key = EntityKey::strike(25000.0);
        let mut session = make_session();
        assert_eq!(session.seed_historical(&option_rows(), now()), 2);
        assert!(session.reconciler().is_historical_only(&key));

        let report = session.on_tick_at(&json!({ "symbol": "NIFTY25000CE", "ltp": 126.0 }), now());
        assert_eq!(report.applied[0].key, key);
        assert_eq!(report.applied[0].slot, Slot::Ce);
        assert_eq!(session.reconciler().provenance(&key, Slot::Ce), Provenance::Live);
        assert_eq!(session.reconciler().provenance(&key, Slot::Pe), Provenance::Historical);

        session.seed_historical(&option_rows(), now());
        assert_eq!(session.reconciler().provenance(&key, Slot::Ce), Provenance::Live);
        assert!(!session.reconciler().is_historical_only(&key));
    }

    #[test]
    fn test_unsubscribe_clears_history_and_slot_idempotently() {
        let key = EntityKey::strike(25000.0);
        let mut session = make_session();
        session.seed_historical(&option_rows(), now());
        session.on_tick_at(&json!({ "symbol": "NIFTY25000CE", "ltp": 126.0 }), now());

        assert_eq!(session.on_unsubscribed(["NIFTY25000CE"]), 1);
        assert_eq!(session.on_unsubscribed(["NIFTY25000CE"]), 0);
        assert_eq!(session.history().len("NIFTY25000CE"), 0);
        assert_eq!(session.reconciler().provenance(&key, Slot::Ce), Provenance::Empty);
        assert_eq!(session.reconciler().provenance(&key, Slot::Pe), Provenance::Historical);

        // late tick after unsubscribe does not resurrect the slot
        let report = session.on_tick_at(&json!({ "symbol": "NIFTY25000CE", "ltp": 127.0 }), now());
        assert_eq!(report.ignored, 1);
        assert_eq!(session.reconciler().provenance(&key, Slot::Ce), Provenance::Empty);
    }

    #[test]
    fn test_group_change_resets_but_same_group_does_not() {
        let mut session = make_session();
        assert!(session.select_group("2024-10-31"));
        session.seed_historical(&option_rows(), now());
        session.on_tick_at(&json!({ "symbol": "NIFTY", "ltp": 25000.0 }), now());

        assert!(!session.select_group("2024-10-31"));
        assert_eq!(session.current_view().len(), 2);

        assert!(session.select_group("2024-11-28"));
        assert!(session.current_view().is_empty());
        assert_eq!(session.history().len("NIFTY"), 0);
        assert!(session.is_subscribed("NIFTY"));
        assert_eq!(session.group(), Some("2024-11-28"));
    }

    #[test]
    fn test_symbol_table_shrinks_with_the_subscription_set() {
        let mut session = FeedSession::new(5);
        session.on_subscribed(["OLD25000CE"]);
        session.select_group("2024-10-31");
        let rows: Vec<HistoricalRow> = serde_json::from_value(json!([
            { "symbol": "OLD25000CE", "strike": 25000, "option_type": "CE", "premium": 120.0 },
            { "symbol": "OLD25000PE", "strike": 25000, "option_type": "PE", "premium": 95.0 }
        ]))
        .unwrap();
        session.seed_historical(&rows, now());
        assert_eq!(session.symbol_table().len(), 2);

        // the new grouping keeps only what is still subscribed
        session.select_group("2024-11-28");
        assert_eq!(session.symbol_table().len(), 1);
        assert!(!session.symbol_table().contains("OLD25000PE"));

        session.on_unsubscribed(["OLD25000CE"]);
        assert!(session.symbol_table().is_empty());
    }

    #[test]
    fn test_replace_subscriptions_prunes_stale_mappings() {
        let mut session = make_session();
        session.seed_historical(&option_rows(), now());
        session.register("BANKNIFTYNEAR", EntityKey::symbol("BANKNIFTY"), Slot::Near);
        assert_eq!(session.symbol_table().len(), 3);

        session.replace_subscriptions(["BANKNIFTYNEAR", "NIFTY25000PE"]);
        assert_eq!(session.symbol_table().len(), 2);
        assert!(!session.symbol_table().contains("NIFTY25000CE"));
        assert_eq!(
            session.symbol_table().resolve("BANKNIFTYNEAR"),
            Some((EntityKey::symbol("BANKNIFTY"), Slot::Near))
        );
    }

    #[test]
    fn test_replace_subscriptions_resets_only_on_change() {
        let mut session = make_session();
        session.on_tick_at(&json!({ "symbol": "NIFTY", "ltp": 25000.0 }), now());

        assert!(!session.replace_subscriptions(["NIFTY25000PE", "NIFTY", "NIFTY25000CE"]));
        assert_eq!(session.current_view().len(), 1);

        assert!(session.replace_subscriptions(["BANKNIFTY"]));
        assert!(session.current_view().is_empty());
        assert_eq!(session.subscribed().collect::<Vec<_>>(), vec!["BANKNIFTY"]);
    }

    #[test]
    fn test_end_to_end_metrics_over_live_view() {
        let mut session = FeedSession::new(5);
        session.on_subscribed(["NIFTY", "NIFTYNEAR", "NIFTYNEXT", "NIFTY950CE"]);
        session.register("NIFTYNEAR", EntityKey::symbol("NIFTY"), Slot::Near);
        session.register("NIFTYNEXT", EntityKey::symbol("NIFTY"), Slot::Next);
        session.register("NIFTY950CE", EntityKey::strike(950.0), Slot::Ce);

        session.on_tick_at(
            &json!([
                { "symbol": "NIFTY", "ltp": 1000.0 },
                { "symbol": "NIFTYNEAR", "ltp": 1005.0 },
                { "symbol": "NIFTYNEXT", "ltp": 1010.0 },
                { "symbol": "NIFTY950CE", "ltp": 12.5 }
            ]),
            now(),
        );

        let view = session.current_view();
        let legs = &view[&EntityKey::symbol("NIFTY")];
        let spread = gap(legs.price(Slot::Next), legs.price(Slot::Near), legs.price(Slot::Spot)).unwrap();
        assert!((spread.amount - 5.0).abs() < 1e-9);
        assert!((spread.percentage - 0.5).abs() < 1e-9);

        let underlying = legs.price(Slot::Spot);
        let option = &view[&EntityKey::strike(950.0)];
        let otm = otm_percent(underlying, Some(950.0), OptionSide::Ce).unwrap();
        assert!((otm - -5.0).abs() < 1e-9);

        let premium_pct = premium_percent(option.price(Slot::Ce), underlying);
        assert!((premium_pct.unwrap() - 1.25).abs() < 1e-9);
        let monthly = monthly_premium_percent(premium_pct, Some(10)).unwrap();
        assert!((monthly - 3.75).abs() < 1e-9);
    }
}
