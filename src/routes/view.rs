//! # routes::view
//!
//! Read side for the dashboard plus the host controls that reshape the view.
//!
//! | Method | Path                         | Description                                |
//! |--------|------------------------------|--------------------------------------------|
//! | GET    | `/api/view`                  | Every entity with its slots and mode       |
//! | GET    | `/api/view/chain`            | Covered-call option chain                  |
//! | GET    | `/api/view/spreads`          | Futures spread rows + average-gap summary  |
//! | GET    | `/api/view/history/:symbol`  | Newest `n` ticks for a symbol              |
//! | GET    | `/api/view/errors`           | Last rejection per symbol                  |
//! | POST   | `/api/view/seed`             | Seed empty slots from historical rows      |
//! | POST   | `/api/view/group`            | Select grouping (resets on change)         |
//! | POST   | `/api/view/reset`            | Reset every slot to EMPTY                  |

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    engine::{
        metrics::days_to_expiry,
        projection::{option_chain, spread_summary, spreads},
    },
    error::AppError,
    events::WsEvent,
    models::{EntityKey, HistoricalRow, Slot},
    rows::fetch_rows,
    state::SharedState,
};

// ─── GET /api/view ────────────────────────────────────────────────────────────

pub async fn get_view(State(state): State<SharedState>) -> Json<Value> {
    let session = state.session.read().await;
    let view = session.current_view();
    let now = Utc::now();

    let entities: Vec<Value> = view
        .iter()
        .map(|(key, entity)| {
            let ages: BTreeMap<Slot, i64> = entity
                .slots
                .iter()
                .map(|(slot, snap)| (*slot, snap.age_secs(now)))
                .collect();
            json!({
                "key":      key,
                "mode":     entity.mode(),
                "slots":    entity.slots,
                "age_secs": ages,
            })
        })
        .collect();

    Json(json!({
        "ok":         true,
        "session_id": session.id(),
        "group":      session.group(),
        "count":      entities.len(),
        "entities":   entities,
    }))
}

// ─── GET /api/view/chain ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ChainQuery {
    /// Explicit underlying price.
    pub underlying:        Option<f64>,
    /// Read the underlying from this entity's `SPOT` slot instead.
    pub underlying_symbol: Option<String>,
    pub days_to_expiry:    Option<i64>,
    /// `YYYY-MM-DD`; used when `days_to_expiry` is absent.
    pub expiry:            Option<String>,
    pub atm_threshold_pct: Option<f64>,
}

pub async fn get_chain(
    State(state): State<SharedState>,
    Query(query): Query<ChainQuery>,
) -> Result<Json<Value>, AppError> {
    let days = match (query.days_to_expiry, query.expiry.as_deref()) {
        (Some(days), _) => Some(days),
        (None, Some(raw)) => {
            let expiry = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| AppError::BadRequest(format!("expiry must be YYYY-MM-DD, got '{raw}'")))?;
            Some(days_to_expiry(expiry, Utc::now().date_naive()))
        }
        (None, None) => None,
    };
    let threshold = query
        .atm_threshold_pct
        .filter(|t| t.is_finite() && *t >= 0.0)
        .unwrap_or(state.config.atm_threshold_pct);

    let session = state.session.read().await;
    let view = session.current_view();

    let underlying = query.underlying.or_else(|| {
        let symbol = query.underlying_symbol.as_deref()?;
        view.get(&EntityKey::symbol(symbol))?.price(Slot::Spot)
    });

    let rows = option_chain(&view, underlying, days, threshold, Utc::now());

    Ok(Json(json!({
        "ok":                true,
        "underlying":        underlying,
        "days_to_expiry":    days,
        "atm_threshold_pct": threshold,
        "count":             rows.len(),
        "rows":              rows,
    })))
}

// ─── GET /api/view/spreads ────────────────────────────────────────────────────

pub async fn get_spreads(State(state): State<SharedState>) -> Json<Value> {
    let rows = spreads(&state.session.read().await.current_view(), Utc::now());
    let summary = spread_summary(&rows);

    Json(json!({
        "ok":      true,
        "summary": summary,
        "rows":    rows,
    }))
}

// ─── GET /api/view/history/:symbol ────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub n: Option<usize>,
}

pub async fn get_history(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let session = state.session.read().await;
    let history = session.history();

    if !history.contains(&symbol) {
        return Err(AppError::NotFound(format!("no tick history for {symbol}")));
    }

    let ticks = history.latest(&symbol, query.n.unwrap_or(history.capacity()));
    Ok(Json(json!({
        "ok":       true,
        "symbol":   symbol,
        "capacity": history.capacity(),
        "count":    ticks.len(),
        "ticks":    ticks,
    })))
}

// ─── GET /api/view/errors ─────────────────────────────────────────────────────

pub async fn get_errors(State(state): State<SharedState>) -> Json<Value> {
    let session = state.session.read().await;
    let errors = session.errors();
    Json(json!({
        "ok":     true,
        "count":  errors.len(),
        "errors": errors,
    }))
}

// ─── POST /api/view/seed ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SeedBody {
    /// Rows supplied inline; when absent a page is fetched from `ROWS_URL`.
    #[serde(default)]
    pub rows: Option<Vec<HistoricalRow>>,
    #[serde(default)]
    pub page: Option<u32>,
}

pub async fn seed_view(
    State(state): State<SharedState>,
    Json(body): Json<SeedBody>,
) -> Result<Json<Value>, AppError> {
    // ── 1. Rows: inline, or one page from the collaborator (no lock held) ────
    let (rows, page, total_pages) = match body.rows {
        Some(rows) => (rows, None, None),
        None => {
            let url = state.config.rows_url.as_deref().ok_or_else(|| {
                AppError::BadRequest("no rows in body and ROWS_URL is not configured".into())
            })?;
            let page = fetch_rows(&state.http_client, url, body.page.unwrap_or(1), state.config.rows_timeout)
                .await
                .map_err(|e| {
                    warn!(error = %e, "Rows collaborator failed — view left unchanged");
                    AppError::Upstream(format!("{e:#}"))
                })?;
            (page.rows, Some(page.page), Some(page.total_pages))
        }
    };

    // ── 2. Seed ──────────────────────────────────────────────────────────────
    let applied = state
        .session
        .write()
        .await
        .seed_historical(&rows, Utc::now());

    state.broadcast(&WsEvent::Seeded { rows: rows.len(), applied });

    Ok(Json(json!({
        "ok":          true,
        "rows":        rows.len(),
        "applied":     applied,
        "page":        page,
        "total_pages": total_pages,
    })))
}

// ─── POST /api/view/group ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GroupBody {
    pub group: String,
}

pub async fn select_group(
    State(state): State<SharedState>,
    Json(body): Json<GroupBody>,
) -> Result<Json<Value>, AppError> {
    let group = body.group.trim().to_string();
    if group.is_empty() {
        return Err(AppError::BadRequest("group must not be empty".into()));
    }

    let changed = state.session.write().await.select_group(group.clone());
    if changed {
        state.broadcast(&WsEvent::ViewReset {
            reason: "grouping changed".into(),
            group:  Some(group.clone()),
        });
    }

    Ok(Json(json!({
        "ok":      true,
        "group":   group,
        "changed": changed,
    })))
}

// ─── POST /api/view/reset ─────────────────────────────────────────────────────

pub async fn reset_view(State(state): State<SharedState>) -> Json<Value> {
    let group = {
        let mut session = state.session.write().await;
        session.reset();
        session.group().map(str::to_string)
    };

    info!(?group, "🧹 View reset");
    state.broadcast(&WsEvent::ViewReset {
        reason: "explicit reset".into(),
        group,
    });

    Json(json!({ "ok": true }))
}
