//! Append-only movement ledger for physical tool inventory.
//!
//! Each tool carries a `stock_inicial` (registered quantity) and a live
//! `stock`. Stock changes only through typed movements (intake, issue,
//! return, write-off) appended to a JSONL journal, or through explicit
//! administrative corrections. The tool and movement tables are a fold
//! over that journal, and the stock level after any past movement is
//! reconstructed backward from the present stock on demand.

mod archive;
mod config;
mod entry;
mod error;
mod inventory;
mod journal;
mod ledger;
mod model;
pub mod projector;
mod reconcile;
pub mod snapshot;
mod validate;
mod view;

pub use config::LedgerConfig;
pub use entry::{Change, Entry};
pub use error::LedgerError;
pub use inventory::{Inventory, ToolLedger};
pub use journal::{
    line_hash, AppendConflict, AppendResult, ConditionalAppendError, Journal, JournalReader,
    LockMode,
};
pub use ledger::{Ledger, LedgerBuilder, OutstandingOverride, ResetConfirmation, ResetOutcome};
pub use model::{
    Direction, MAX_STOCK, Movement, MovementContext, MovementId, MovementKind, MovementStatus,
    Tool, ToolId,
};
pub use projector::{StockTimeline, TimelineEntry};
pub use reconcile::{Anomaly, Availability, StockBand, Thresholds, ToolReport};
pub use snapshot::Snapshot;
pub use validate::{AcceptedMovement, MovementRequest, validate};
pub use view::{ReduceFn, View};
