//! # state
//!
//! Shared application state: one [`FeedSession`] behind an async `RwLock`,
//! the WebSocket broadcast channel, the shared HTTP client for the rows
//! collaborator and a few feed health counters.
//!
//! Handlers take the session lock only around synchronous engine calls and
//! release it before any network I/O or broadcast.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use crate::config::Config;
use crate::engine::session::{FeedSession, TickReport};
use crate::events::WsEvent;

// ─── AppState ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────────────
    pub session: Arc<RwLock<FeedSession>>,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    /// Pre-serialized `WsEvent` JSON.
    pub broadcast_tx: broadcast::Sender<String>,

    // ── HTTP Client ───────────────────────────────────────────────────────────
    pub http_client: reqwest::Client,

    pub config: Arc<Config>,

    // ── Feed Health ───────────────────────────────────────────────────────────
    pub tick_count:     Arc<AtomicU64>,
    pub reject_count:   Arc<AtomicU64>,
    /// Last lifecycle status reported by the feed; informational only.
    pub feed_connected: Arc<AtomicBool>,
    pub last_tick_at:   Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_capacity);

        Self {
            session:        Arc::new(RwLock::new(FeedSession::new(config.history_capacity))),
            broadcast_tx,
            http_client:    reqwest::Client::new(),
            config:         Arc::new(config),
            tick_count:     Arc::new(AtomicU64::new(0)),
            reject_count:   Arc::new(AtomicU64::new(0)),
            feed_connected: Arc::new(AtomicBool::new(false)),
            last_tick_at:   Arc::new(RwLock::new(None)),
        }
    }

    // ── Helper Methods ────────────────────────────────────────────────────────

    /// Send to every WebSocket client. Having no listeners is not an error.
    pub fn broadcast(&self, event: &WsEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }

    /// Bump the health counters after an `on_tick` call.
    pub async fn record_report(&self, report: &TickReport, at: DateTime<Utc>) {
        self.tick_count.fetch_add(report.accepted() as u64, Ordering::Relaxed);
        self.reject_count.fetch_add(report.rejected.len() as u64, Ordering::Relaxed);
        if report.accepted() > 0 {
            *self.last_tick_at.write().await = Some(at);
        }
    }

    pub async fn stats(&self) -> WsEvent {
        let (entities, subscribed) = {
            let session = self.session.read().await;
            (session.reconciler().len(), session.subscribed().count())
        };

        WsEvent::ServerStats {
            tick_count:   self.tick_count.load(Ordering::Relaxed),
            reject_count: self.reject_count.load(Ordering::Relaxed),
            entities,
            subscribed,
            last_tick_at: *self.last_tick_at.read().await,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_state(config: Config) -> SharedState {
    Arc::new(AppState::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_report_counts_and_stamps() {
        let state = AppState::default();
        let at = Utc::now();

        let report = {
            let mut session = state.session.write().await;
            session.on_subscribed(["NIFTY"]);
            session.on_tick_at(
                &json!([{ "symbol": "NIFTY", "ltp": 25000.0 }, { "symbol": "NIFTY", "ltp": -1.0 }]),
                at,
            )
        };
        state.record_report(&report, at).await;

        assert_eq!(state.tick_count.load(Ordering::Relaxed), 1);
        assert_eq!(state.reject_count.load(Ordering::Relaxed), 1);
        assert_eq!(*state.last_tick_at.read().await, Some(at));

        match state.stats().await {
            WsEvent::ServerStats { entities, subscribed, .. } => {
                assert_eq!(entities, 1);
                assert_eq!(subscribed, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let state = AppState::default();
        let mut rx = state.broadcast_tx.subscribe();
        state.broadcast(&WsEvent::FeedStatus { connected: true, message: None });
        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("FEED_STATUS"));
    }
}
