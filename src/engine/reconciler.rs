//! # engine::reconciler
//!
//! **Symbol Snapshot Reconciler** — the latest known state per entity key,
//! merged from two provenance tiers.
//!
//! ```text
//!            seed_historical           apply_live_tick
//!   EMPTY ───────────────────▶ HISTORICAL ───────────────▶ LIVE ─┐
//!     │                                                     ▲    │ apply_live_tick
//!     └─────────────────── apply_live_tick ─────────────────┘◀───┘
//!
//!   reset / reset_slot:  * ──▶ EMPTY
//! ```
//!
//! * Live always replaces whatever a slot holds (last write wins, even on
//!   identical timestamps).
//! * A historical seed only fills empty slots, so it can never downgrade live
//!   data.
//! * Nothing here is cleared on feed disconnect; stale values stay visible.
//!
//! The reconciler also owns the per-symbol [`TickHistory`], so a view has a
//! single owner for all of its live state.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::engine::history::TickHistory;
use crate::models::{EntityKey, EntityView, HistoricalRow, Provenance, Slot, Snapshot, Tick};

// ─── Key Resolution ───────────────────────────────────────────────────────────

/// Maps a validated tick's symbol to the `(key, slot)` it updates.
pub trait KeyResolver {
    fn resolve(&self, symbol: &str) -> Option<(EntityKey, Slot)>;
}

impl<F> KeyResolver for F
where
    F: Fn(&str) -> Option<(EntityKey, Slot)>,
{
    fn resolve(&self, symbol: &str) -> Option<(EntityKey, Slot)> {
        self(symbol)
    }
}

/// Every symbol is its own entity, in the `SPOT` slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolKey;

impl KeyResolver for SymbolKey {
    fn resolve(&self, symbol: &str) -> Option<(EntityKey, Slot)> {
        Some((EntityKey::symbol(symbol), Slot::Spot))
    }
}

/// Explicit symbol → `(key, slot)` registrations (e.g. option symbols to
/// strike + side), falling back to [`SymbolKey`] for unregistered symbols.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<String, (EntityKey, Slot)>,
}

impl SymbolTable {
    pub fn register(&mut self, symbol: impl Into<String>, key: EntityKey, slot: Slot) {
        self.entries.insert(symbol.into(), (key, slot));
    }

    pub fn forget(&mut self, symbol: &str) {
        self.entries.remove(symbol);
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the registrations whose symbol passes `keep`.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.entries.retain(|symbol, _| keep(symbol));
    }
}

impl KeyResolver for SymbolTable {
    fn resolve(&self, symbol: &str) -> Option<(EntityKey, Slot)> {
        self.entries
            .get(symbol)
            .cloned()
            .or_else(|| SymbolKey.resolve(symbol))
    }
}

// ─── Outcome ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The slot now holds the tick; `previous` is what it held before.
    Applied {
        key: EntityKey,
        slot: Slot,
        previous: Provenance,
    },
    /// The resolver had no mapping for the symbol; nothing changed.
    Unresolved,
}

// ─── Reconciler ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Entity {
    slots: BTreeMap<Slot, Snapshot>,
    /// A live tick has touched this key since the last reset.
    live_seen: bool,
}

impl Entity {
    fn view(&self) -> EntityView {
        EntityView {
            historical_only: !self.live_seen,
            slots: self.slots.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    entities: BTreeMap<EntityKey, Entity>,
    history: TickHistory,
}

impl Reconciler {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            entities: BTreeMap::new(),
            history: TickHistory::new(history_capacity),
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Bulk-load rows from the REST collaborator as `HISTORICAL`.
    ///
    /// Only `(key, slot)` pairs with no current snapshot are filled; existing
    /// historical or live values are left untouched. Rows that cannot be
    /// resolved to a key are skipped. Returns the number of slots filled.
    pub fn seed_historical(&mut self, rows: &[HistoricalRow], now: DateTime<Utc>) -> usize {
        let mut filled = 0;
        for row in rows {
            let Some((key, slot)) = row.entity() else {
                debug!(symbol = ?row.symbol, "Seed row has no resolvable key — skipped");
                continue;
            };

            let entity = self.entities.entry(key).or_default();
            if let Entry::Vacant(vacant) = entity.slots.entry(slot) {
                vacant.insert(row.to_snapshot(now));
                filled += 1;
            }
        }

        debug!(rows = rows.len(), filled, "Historical seed applied");
        filled
    }

    /// Upsert the `LIVE` snapshot for the tick's `(key, slot)`, replacing
    /// whatever the slot held.
    pub fn apply_live_tick<R>(&mut self, tick: &Tick, resolver: &R) -> ApplyOutcome
    where
        R: KeyResolver + ?Sized,
    {
        let Some((key, slot)) = resolver.resolve(&tick.symbol) else {
            debug!(symbol = %tick.symbol, "No entity mapping for symbol — live tick not applied");
            return ApplyOutcome::Unresolved;
        };

        let entity = self.entities.entry(key.clone()).or_default();
        let previous = entity
            .slots
            .insert(slot, Snapshot::from_live(tick))
            .map_or(Provenance::Empty, |s| s.provenance);
        entity.live_seen = true;

        if previous != Provenance::Live {
            debug!(%key, ?slot, ?previous, "Slot switched to LIVE");
        }

        ApplyOutcome::Applied { key, slot, previous }
    }

    /// Apply the tick live and append it to its symbol's history ring.
    pub fn record<R>(&mut self, tick: Tick, resolver: &R) -> ApplyOutcome
    where
        R: KeyResolver + ?Sized,
    {
        let outcome = self.apply_live_tick(&tick, resolver);
        self.history.push(tick);
        outcome
    }

    /// `* → EMPTY` for every key, and drop all tick history.
    pub fn reset(&mut self) {
        self.entities.clear();
        self.history.clear_all();
    }

    /// `* → EMPTY` for one slot. The key's live flag survives only if another
    /// slot still holds live data. Idempotent.
    pub fn reset_slot(&mut self, key: &EntityKey, slot: Slot) {
        let Some(entity) = self.entities.get_mut(key) else {
            return;
        };
        entity.slots.remove(&slot);
        if entity.slots.is_empty() {
            self.entities.remove(key);
        } else {
            entity.live_seen = entity
                .slots
                .values()
                .any(|s| s.provenance == Provenance::Live);
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Owned projection of every entity; later writes do not affect it.
    pub fn current_view(&self) -> BTreeMap<EntityKey, EntityView> {
        self.entities
            .iter()
            .map(|(key, entity)| (key.clone(), entity.view()))
            .collect()
    }

    pub fn entity(&self, key: &EntityKey) -> Option<EntityView> {
        self.entities.get(key).map(Entity::view)
    }

    /// `true` until at least one live tick has been applied to `key` since the
    /// last reset (unknown keys have no live data either).
    pub fn is_historical_only(&self, key: &EntityKey) -> bool {
        self.entities.get(key).map_or(true, |e| !e.live_seen)
    }

    pub fn provenance(&self, key: &EntityKey, slot: Slot) -> Provenance {
        self.entities
            .get(key)
            .and_then(|e| e.slots.get(&slot))
            .map_or(Provenance::Empty, |s| s.provenance)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn history(&self) -> &TickHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut TickHistory {
        &mut self.history
    }
}
