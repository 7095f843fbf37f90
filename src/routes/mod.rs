//! Axum route handlers, grouped by the collaborator they serve.

pub mod feed;
pub mod monitor;
pub mod view;
