//! Domain models shared across the entire Spreadwatch system.

pub mod row;
pub mod snapshot;
pub mod tick;

pub use row::HistoricalRow;
pub use snapshot::{EntityKey, EntityView, OptionSide, Provenance, Slot, Snapshot};
pub use tick::{Quote, Tick};
