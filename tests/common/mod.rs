#![allow(dead_code)]

use std::path::Path;
use stockfold::{Ledger, LockMode, Movement, MovementKind, MovementRequest, ToolId};

pub fn drill() -> ToolId {
    ToolId::from("T-001")
}

pub fn saw() -> ToolId {
    ToolId::from("T-002")
}

/// A ledger in `dir` with a drill registered at `initial_stock`.
pub fn ledger_with_drill(dir: &Path, initial_stock: i64) -> Ledger {
    let mut ledger = Ledger::open(dir).unwrap();
    ledger
        .register_tool(drill(), "Taladro percutor", initial_stock)
        .unwrap();
    ledger
}

pub fn unlocked(dir: &Path) -> Ledger {
    Ledger::builder(dir).lock_mode(LockMode::None).open().unwrap()
}

pub fn issue(ledger: &mut Ledger, tool: &ToolId, quantity: i64) -> Movement {
    ledger
        .append_movement(tool, MovementRequest::new(MovementKind::Salida, quantity))
        .unwrap()
}

pub fn give_back(ledger: &mut Ledger, tool: &ToolId, quantity: i64) -> Movement {
    ledger
        .append_movement(
            tool,
            MovementRequest::new(MovementKind::Devolucion, quantity),
        )
        .unwrap()
}

pub fn intake(ledger: &mut Ledger, tool: &ToolId, quantity: i64) -> Movement {
    ledger
        .append_movement(tool, MovementRequest::new(MovementKind::Entrada, quantity))
        .unwrap()
}

pub fn write_off(ledger: &mut Ledger, tool: &ToolId, quantity: i64) -> Movement {
    ledger
        .append_movement(tool, MovementRequest::new(MovementKind::Baja, quantity))
        .unwrap()
}

/// `n` alternating issue/return pairs of one unit each.
pub fn churn(ledger: &mut Ledger, tool: &ToolId, n: usize) {
    for _ in 0..n {
        issue(ledger, tool, 1);
        give_back(ledger, tool, 1);
    }
}

pub fn stock_of(ledger: &Ledger, tool: &ToolId) -> i64 {
    ledger.get_tool(tool).unwrap().tool.stock
}

pub fn stock_after(ledger: &Ledger, tool: &ToolId) -> Vec<i64> {
    ledger
        .stock_timeline(tool)
        .unwrap()
        .entries
        .iter()
        .map(|e| e.stock_after)
        .collect()
}
