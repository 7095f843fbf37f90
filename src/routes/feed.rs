//! # routes::feed
//!
//! Live feed ingress. The feed adapter forwards its events here; each handler
//! maps one-to-one onto a [`FeedSession`](crate::engine::FeedSession) entry point.
//!
//! | Method | Path                    | Description                                  |
//! |--------|-------------------------|----------------------------------------------|
//! | POST   | `/api/feed/tick`        | One tick object or an array of them          |
//! | POST   | `/api/feed/subscribe`   | Subscription ack (symbols or symbol mappings)|
//! | POST   | `/api/feed/unsubscribe` | Symbols dropped by the feed                  |
//! | POST   | `/api/feed/status`      | Connect / disconnect / error notification    |
//! | GET    | `/api/feed/health`      | Counters, connection flag, last tick time    |

use std::sync::atomic::Ordering;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    engine::validator::is_valid_symbol,
    error::AppError,
    events::WsEvent,
    models::{EntityKey, Slot},
    state::SharedState,
};

// ─── Request Bodies ───────────────────────────────────────────────────────────

/// A bare symbol, or a symbol with the entity slot its ticks update.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SymbolSpec {
    Plain(String),
    Mapped {
        symbol: String,
        /// Entity key name (e.g. the underlying for a futures leg).
        #[serde(default)]
        key:    Option<String>,
        /// Strike for option symbols; wins over `key`.
        #[serde(default)]
        strike: Option<f64>,
        #[serde(default)]
        slot:   Option<String>,
    },
}

impl SymbolSpec {
    fn symbol(&self) -> &str {
        match self {
            SymbolSpec::Plain(symbol) | SymbolSpec::Mapped { symbol, .. } => symbol,
        }
    }

    /// `Ok(None)` = no explicit mapping, the symbol is its own entity.
    fn mapping(&self) -> Result<Option<(EntityKey, Slot)>, AppError> {
        let SymbolSpec::Mapped { symbol, key, strike, slot } = self else {
            return Ok(None);
        };

        let slot = match slot.as_deref() {
            Some(raw) => Slot::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("unknown slot '{raw}' for {symbol}")))?,
            None if strike.is_some() => {
                return Err(AppError::BadRequest(format!("strike mapping for {symbol} needs a CE/PE slot")));
            }
            None => Slot::Spot,
        };

        let key = match (strike, key.as_deref()) {
            (Some(strike), _) if strike.is_finite() && *strike > 0.0 => EntityKey::strike(*strike),
            (Some(_), _) => return Err(AppError::BadRequest(format!("invalid strike for {symbol}"))),
            (None, Some(key)) if !key.trim().is_empty() => EntityKey::symbol(key.trim()),
            (None, _) => EntityKey::symbol(symbol.as_str()),
        };
        Ok(Some((key, slot)))
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscribeBody {
    pub symbols: Vec<SymbolSpec>,
    /// Replace the whole subscribed set instead of adding to it.
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeBody {
    pub symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedStatusBody {
    pub connected: bool,
    #[serde(default)]
    pub message:   Option<String>,
}

// ─── POST /api/feed/tick ──────────────────────────────────────────────────────

pub async fn handle_tick(
    State(state): State<SharedState>,
    Json(raw): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();

    // ── 1. Engine call under the lock; collect what to broadcast ─────────────
    let (report, updates) = {
        let mut session = state.session.write().await;
        let report = session.on_tick_at(&raw, now);
        let updates: Vec<WsEvent> = report
            .applied
            .iter()
            .filter_map(|applied| {
                let view = session.reconciler().entity(&applied.key)?;
                Some(WsEvent::SnapshotUpdated {
                    symbol: applied.symbol.clone(),
                    key:    applied.key.clone(),
                    slot:   applied.slot,
                    view:   Box::new(view),
                })
            })
            .collect();
        (report, updates)
    };

    // ── 2. Counters + broadcast after the lock is released ───────────────────
    state.record_report(&report, now).await;
    for event in &updates {
        state.broadcast(event);
    }
    for rejected in &report.rejected {
        state.broadcast(&WsEvent::TickRejected {
            symbol:  rejected.symbol.clone(),
            message: rejected.message.clone(),
        });
    }

    Ok(Json(json!({
        "ok":         true,
        "accepted":   report.accepted(),
        "applied":    report.applied,
        "rejected":   report.rejected,
        "ignored":    report.ignored,
        "unresolved": report.unresolved,
    })))
}

// ─── POST /api/feed/subscribe ─────────────────────────────────────────────────

pub async fn handle_subscribe(
    State(state): State<SharedState>,
    Json(body): Json<SubscribeBody>,
) -> Result<Json<Value>, AppError> {
    // ── 1. Validate every entry before touching the session ──────────────────
    let mut entries = Vec::with_capacity(body.symbols.len());
    for spec in &body.symbols {
        let symbol = spec.symbol().trim();
        if !is_valid_symbol(symbol) {
            return Err(AppError::BadRequest(format!("invalid symbol '{symbol}'")));
        }
        entries.push((symbol.to_string(), spec.mapping()?));
    }
    let symbols: Vec<String> = entries.iter().map(|(symbol, _)| symbol.clone()).collect();

    // ── 2. Apply ─────────────────────────────────────────────────────────────
    let (added, reset) = {
        let mut session = state.session.write().await;
        for (symbol, mapping) in &entries {
            if let Some((key, slot)) = mapping {
                session.register(symbol.as_str(), key.clone(), *slot);
            }
        }
        if body.replace {
            let reset = session.replace_subscriptions(symbols.iter().cloned());
            (symbols.len(), reset)
        } else {
            (session.on_subscribed(symbols.iter().cloned()), false)
        }
    };

    if reset {
        state.broadcast(&WsEvent::ViewReset {
            reason: "subscriptions replaced".into(),
            group:  state.session.read().await.group().map(str::to_string),
        });
    }
    state.broadcast(&WsEvent::Subscribed { symbols: symbols.clone() });

    Ok(Json(json!({
        "ok":      true,
        "added":   added,
        "reset":   reset,
        "symbols": symbols,
    })))
}

// ─── POST /api/feed/unsubscribe ───────────────────────────────────────────────

pub async fn handle_unsubscribe(
    State(state): State<SharedState>,
    Json(body): Json<UnsubscribeBody>,
) -> Json<Value> {
    let removed = state.session.write().await.on_unsubscribed(&body.symbols);

    state.broadcast(&WsEvent::Unsubscribed { symbols: body.symbols.clone() });

    Json(json!({
        "ok":      true,
        "removed": removed,
        "symbols": body.symbols,
    }))
}

// ─── POST /api/feed/status ────────────────────────────────────────────────────

/// Feed lifecycle notification. Only logged and flagged: a disconnect or an
/// error never clears the view, so last known values stay on screen.
pub async fn handle_feed_status(
    State(state): State<SharedState>,
    Json(body): Json<FeedStatusBody>,
) -> Json<Value> {
    let was_connected = state.feed_connected.swap(body.connected, Ordering::Relaxed);

    if body.connected {
        info!(was_connected, "📡 Live feed connected");
    } else {
        warn!(
            was_connected,
            message = body.message.as_deref().unwrap_or("-"),
            "📴 Live feed unavailable — keeping last known values"
        );
    }

    state.broadcast(&WsEvent::FeedStatus {
        connected: body.connected,
        message:   body.message.clone(),
    });

    Json(json!({
        "ok":        true,
        "connected": body.connected,
    }))
}

// ─── GET /api/feed/health ─────────────────────────────────────────────────────

pub async fn health_check(State(state): State<SharedState>) -> Json<Value> {
    let (session_id, entities, subscribed, errors) = {
        let session = state.session.read().await;
        (
            session.id(),
            session.reconciler().len(),
            session.subscribed().count(),
            session.errors().len(),
        )
    };

    Json(json!({
        "ok":             true,
        "session_id":     session_id,
        "feed_connected": state.feed_connected.load(Ordering::Relaxed),
        "tick_count":     state.tick_count.load(Ordering::Relaxed),
        "reject_count":   state.reject_count.load(Ordering::Relaxed),
        "last_tick_at":   *state.last_tick_at.read().await,
        "entities":       entities,
        "subscribed":     subscribed,
        "errors":         errors,
    }))
}
