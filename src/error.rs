use crate::model::{MAX_STOCK, MovementKind, ToolId};
use crate::reconcile::Anomaly;
use std::io;
use thiserror::Error;

/// Errors returned by [`Ledger`](crate::Ledger) operations.
///
/// Validation errors (`InvalidQuantity`, `UnknownMovementKind`,
/// `StockViolation`, `StockOutOfRange`, `InvalidStock`) are raised before
/// anything is written and are always fixable by the caller. `Storage`
/// wraps the underlying I/O error unchanged; the ledger never retries.
///
/// `AppliedWithoutRefresh` is the one error returned after a write: the
/// change is durable in the journal, so the caller must not repeat it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("invalid quantity {0}: a movement must move a positive number of units")]
    InvalidQuantity(i64),

    #[error("unknown movement kind '{0}' (expected entrada, salida, devolucion or baja)")]
    UnknownMovementKind(String),

    #[error(
        "tool {tool_id}: {kind} of {requested} exceeds available stock {available} (would leave {resulting})"
    )]
    StockViolation {
        tool_id: ToolId,
        kind: MovementKind,
        available: i64,
        requested: u32,
        resulting: i64,
    },

    #[error("tool {tool_id}: {} reconciliation anomaly(ies): {}", .anomalies.len(), describe(.anomalies))]
    ReconciliationAnomaly {
        tool_id: ToolId,
        anomalies: Vec<Anomaly>,
    },

    #[error(
        "tool {tool_id}: {kind} of {requested} on stock {available} exceeds the maximum stock of {}",
        MAX_STOCK
    )]
    StockOutOfRange {
        tool_id: ToolId,
        kind: MovementKind,
        available: i64,
        requested: u32,
    },

    #[error("invalid stock value {0}: stock counters must be between 0 and {max}", max = MAX_STOCK)]
    InvalidStock(i64),

    #[error("unknown tool {0}")]
    UnknownTool(ToolId),

    #[error("tool {0} is already registered")]
    DuplicateTool(ToolId),

    #[error(
        "tool {tool_id}: initial stock {requested} is below the {outstanding} units still issued; acknowledge the override to proceed"
    )]
    OutstandingExceedsInitial {
        tool_id: ToolId,
        requested: i64,
        outstanding: i64,
    },

    #[error(
        "journal changed since it was last read (expected end offset {expected_offset}, found {actual_offset}); refresh and retry"
    )]
    Conflict {
        expected_offset: u64,
        actual_offset: u64,
    },

    #[error("storage failure: {0}")]
    Storage(#[from] io::Error),

    #[error(
        "change was written to the journal but the in-memory state could not be refreshed: {0}; call refresh() before writing again"
    )]
    AppliedWithoutRefresh(#[source] io::Error),
}

fn describe(anomalies: &[Anomaly]) -> String {
    anomalies
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
