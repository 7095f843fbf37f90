//! Market metrics & live tick reconciliation core.
//!
//! Everything under `engine` is synchronous and owns its data: the host wraps a
//! [`session::FeedSession`] in a lock and calls into it, never across I/O.

pub mod format;
pub mod history;
pub mod metrics;
pub mod projection;
pub mod reconciler;
pub mod session;
pub mod validator;

pub use history::TickHistory;
pub use reconciler::{ApplyOutcome, KeyResolver, Reconciler, SymbolKey, SymbolTable};
pub use session::{FeedSession, TickError, TickReport};
pub use validator::validate_tick;
