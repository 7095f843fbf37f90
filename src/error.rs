//! # error
//!
//! Centralised error types.
//!
//! * [`ValidationError`] — why the validator dropped a tick. Never propagated
//!   as a failure of the feed entry points; the session records it per symbol.
//! * [`AppError`] — what every HTTP handler returns. Axum's `IntoResponse`
//!   impl converts it into a structured JSON body so the dashboard always gets
//!   a machine-readable response even on failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ─── ValidationError ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("tick is not a structured record")]
    NotARecord,

    #[error("symbol is missing")]
    MissingSymbol,

    #[error("invalid symbol '{0}': expected 1-20 chars of [A-Za-z0-9_-]")]
    InvalidSymbol(String),

    #[error("field '{field}' is not numeric")]
    NotNumeric { field: &'static str },

    #[error("field '{field}' is not finite")]
    NonFinite { field: &'static str },

    #[error("field '{field}' is negative ({value})")]
    Negative { field: &'static str, value: f64 },

    #[error("quote field '{field}' must be greater than zero ({value})")]
    NonPositiveQuote { field: &'static str, value: f64 },

    #[error("incomplete quote: '{missing}' is absent")]
    IncompleteQuote { missing: &'static str },

    #[error("inconsistent OHLC: open={open} high={high} low={low} close={close}")]
    InconsistentOhlc {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

// ─── AppError ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource (e.g. a symbol's history) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The bulk rows collaborator failed or is not configured.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
