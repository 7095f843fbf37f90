//! # Spreadwatch
//!
//! Market metrics and live tick reconciliation for spread / option-chain
//! dashboards. The [`engine`] is the synchronous core; [`routes`] and
//! [`state`] host it behind an axum service.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod routes;
pub mod rows;
pub mod state;
