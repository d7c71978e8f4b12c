//! Forward stock updates and backward point-in-time reconstruction.
//!
//! Everything here is a pure function of a stock value and an ordered
//! movement list. Movement lists are taken newest first, the order in
//! which [`Ledger::list_movements`](crate::Ledger::list_movements) returns
//! them.

use crate::model::{Direction, Movement, MovementKind, ToolId};
use serde::Serialize;

/// Signed effect of `quantity` units of `kind` on stock.
///
/// # Examples
///
/// ```
/// use stockfold::MovementKind;
/// use stockfold::projector::delta;
///
/// assert_eq!(delta(MovementKind::Entrada, 5), 5);
/// assert_eq!(delta(MovementKind::Baja, 2), -2);
/// ```
pub fn delta(kind: MovementKind, quantity: u32) -> i64 {
    let quantity = i64::from(quantity);
    match kind.direction() {
        Direction::Increase => quantity,
        Direction::Decrease => -quantity,
    }
}

/// Stock after applying one movement to `stock`, or `None` on overflow.
///
/// ```
/// use stockfold::MovementKind;
/// use stockfold::projector::forward;
///
/// assert_eq!(forward(6, MovementKind::Devolucion, 2), Some(8));
/// assert_eq!(forward(i64::MAX, MovementKind::Entrada, 1), None);
/// ```
pub fn forward(stock: i64, kind: MovementKind, quantity: u32) -> Option<i64> {
    stock.checked_add(delta(kind, quantity))
}

/// Stock before the given movement, knowing the stock right after it.
///
/// Saturates instead of overflowing on a corrupted history; the result
/// then fails reconciliation rather than panicking.
pub fn undo(stock_after: i64, movement: &Movement) -> i64 {
    stock_after.saturating_sub(movement.delta())
}

/// One historical movement annotated with the stock it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub movement: Movement,
    pub stock_after: i64,
}

/// Walk `movements` (newest first) backward from `current_stock`.
///
/// The newest movement left exactly `current_stock`; each step to an older
/// movement undoes the newer one.
///
/// # Examples
///
/// With a current stock of 8 after an issue of 4 and a return of 2:
///
/// ```
/// use stockfold::projector;
/// # use stockfold::{Ledger, MovementRequest};
/// # let dir = tempfile::tempdir().unwrap();
/// # let mut ledger = Ledger::open(dir.path()).unwrap();
/// # ledger.register_tool("T-1", "Taladro", 10).unwrap();
/// # ledger.append_movement(&"T-1".into(), MovementRequest::new("salida", 4)).unwrap();
/// # ledger.append_movement(&"T-1".into(), MovementRequest::new("devolucion", 2)).unwrap();
/// let movements = ledger.list_movements(&"T-1".into()).unwrap();
/// let timeline = projector::reconstruct(8, &movements);
/// let after: Vec<i64> = timeline.iter().map(|e| e.stock_after).collect();
/// assert_eq!(after, vec![8, 6]);
/// ```
pub fn reconstruct(current_stock: i64, movements: &[Movement]) -> Vec<TimelineEntry> {
    let mut running = current_stock;
    movements
        .iter()
        .map(|movement| {
            let entry = TimelineEntry {
                movement: movement.clone(),
                stock_after: running,
            };
            running = undo(running, movement);
            entry
        })
        .collect()
}

/// Stock before the oldest of `movements` (newest first).
pub fn opening_stock(current_stock: i64, movements: &[Movement]) -> i64 {
    movements
        .iter()
        .fold(current_stock, |stock, movement| undo(stock, movement))
}

/// Fold `movements` (newest first) forward, oldest to newest, from `opening`.
pub fn replay(opening: i64, movements: &[Movement]) -> i64 {
    movements
        .iter()
        .rev()
        .fold(opening, |stock, movement| stock.saturating_add(movement.delta()))
}

/// The backward-projection view of one tool's history.
///
/// Computed on every read and never persisted: an administrative stock
/// correction changes every `stock_after` without touching a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockTimeline {
    pub tool_id: ToolId,
    pub current_stock: i64,
    /// Stock before the oldest listed movement.
    pub opening_stock: i64,
    /// Newest first.
    pub entries: Vec<TimelineEntry>,
}

impl StockTimeline {
    pub fn build(tool_id: ToolId, current_stock: i64, movements: &[Movement]) -> Self {
        let entries = reconstruct(current_stock, movements);
        let opening_stock = opening_stock(current_stock, movements);
        StockTimeline {
            tool_id,
            current_stock,
            opening_stock,
            entries,
        }
    }

    /// Whether replaying forward from the opening stock lands on the current stock.
    pub fn replay_matches(&self) -> bool {
        let replayed = self
            .entries
            .iter()
            .rev()
            .fold(self.opening_stock, |stock, entry| {
                stock.saturating_add(entry.movement.delta())
            });
        replayed == self.current_stock
    }

    /// Lowest stock level recorded after any listed movement.
    pub fn minimum(&self) -> Option<i64> {
        self.entries.iter().map(|e| e.stock_after).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
