//! # engine::history
//!
//! **Circular Tick History**: the last N accepted ticks per symbol.
//!
//! Ordering contract: each symbol's ring is kept **oldest first, newest last**
//! (`push_back` / `pop_front`). [`TickHistory::latest`] returns the newest `n`
//! entries in that same arrival order.
//!
//! Eviction is purely capacity-based; there is no age-based expiry.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::models::Tick;

/// Ticks kept per symbol unless configured otherwise.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

#[derive(Debug, Clone)]
pub struct TickHistory {
    capacity: usize,
    /// Key = symbol, Value = ring with the newest tick at the back.
    rings: HashMap<String, VecDeque<Tick>>,
}

impl TickHistory {
    /// A capacity of zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rings: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a tick, evicting the oldest entry once the ring is full.
    /// The ring for a symbol is created lazily on its first tick.
    pub fn push(&mut self, tick: Tick) {
        let capacity = self.capacity;
        let ring = self
            .rings
            .entry(tick.symbol.clone())
            .or_insert_with(|| VecDeque::with_capacity(capacity + 1));

        if ring.len() >= capacity {
            ring.pop_front();
        }
        ring.push_back(tick);
    }

    /// The newest `n` ticks for `symbol` (at most `capacity`), oldest first.
    pub fn latest(&self, symbol: &str, n: usize) -> Vec<Tick> {
        self.rings
            .get(symbol)
            .map(|ring| {
                let skip = ring.len().saturating_sub(n.min(self.capacity));
                ring.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// The most recent tick for `symbol`.
    pub fn last(&self, symbol: &str) -> Option<&Tick> {
        self.rings.get(symbol).and_then(|ring| ring.back())
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.rings.get(symbol).map_or(0, VecDeque::len)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.rings.contains_key(symbol)
    }

    /// Symbols that currently hold a ring, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.rings.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Drop a symbol's ring entirely. Idempotent.
    pub fn clear(&mut self, symbol: &str) {
        if self.rings.remove(symbol).is_some() {
            debug!(symbol, "Tick history cleared");
        }
    }

    pub fn clear_all(&mut self) {
        self.rings.clear();
    }
}

impl Default for TickHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
