//! # events
//!
//! [`WsEvent`] — every event pushed to dashboard clients over `/ws/monitor`.
//!
//! Events are serialized once and sent through a
//! `tokio::sync::broadcast::Sender<String>`, so receivers never need `Clone`
//! on the payload types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{EntityKey, EntityView, Slot};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// A live tick was applied; carries the entity's new state.
    SnapshotUpdated {
        symbol: String,
        key:    EntityKey,
        slot:   Slot,
        view:   Box<EntityView>,
    },

    /// A tick failed validation and was dropped.
    TickRejected {
        symbol:  String,
        message: String,
    },

    Subscribed {
        symbols: Vec<String>,
    },

    Unsubscribed {
        symbols: Vec<String>,
    },

    /// Grouping change or explicit reset: clients should clear their tables.
    ViewReset {
        reason: String,
        group:  Option<String>,
    },

    /// Historical rows were applied to empty slots.
    Seeded {
        rows:    usize,
        applied: usize,
    },

    /// Live feed lifecycle as reported by the collaborator. State is untouched.
    FeedStatus {
        connected: bool,
        message:   Option<String>,
    },

    ServerStats {
        tick_count:   u64,
        reject_count: u64,
        entities:     usize,
        subscribed:   usize,
        last_tick_at: Option<DateTime<Utc>>,
    },
}

impl WsEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_events_are_tagged_screaming_snake_case() {
        let json = WsEvent::TickRejected {
            symbol:  "NIFTY".into(),
            message: "inconsistent OHLC".into(),
        }
        .to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "TICK_REJECTED");
        assert_eq!(value["symbol"], "NIFTY");

        let json = WsEvent::FeedStatus { connected: false, message: None }.to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "FEED_STATUS");
        assert_eq!(value["connected"], false);
    }
}
