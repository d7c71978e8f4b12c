//! The tool and movement tables, derived by folding the journal.

use crate::entry::{Change, Entry};
use crate::model::{Movement, MovementId, MovementKind, Tool, ToolId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tool together with its movement history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLedger {
    pub tool: Tool,
    pub movements: Vec<Movement>,
}

impl ToolLedger {
    /// Movements ordered by `(fecha_movimiento, id)`, newest first.
    pub fn movements_newest_first(&self) -> Vec<Movement> {
        let mut movements = self.movements.clone();
        movements.sort_by(|a, b| (b.recorded_at, b.id).cmp(&(a.recorded_at, a.id)));
        movements
    }

    /// Units issued and not yet returned within the current history.
    pub fn outstanding(&self) -> i64 {
        let balance: i64 = self
            .movements
            .iter()
            .map(|m| match m.kind {
                MovementKind::Salida => i64::from(m.quantity),
                MovementKind::Devolucion => -i64::from(m.quantity),
                MovementKind::Entrada | MovementKind::Baja => 0,
            })
            .sum();
        balance.max(0)
    }
}

/// Derived state of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    tools: BTreeMap<ToolId, ToolLedger>,
    next_movement_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_recorded_at: Option<DateTime<Utc>>,
}

impl Inventory {
    pub fn tool(&self, id: &ToolId) -> Option<&Tool> {
        self.tools.get(id).map(|ledger| &ledger.tool)
    }

    pub fn ledger(&self, id: &ToolId) -> Option<&ToolLedger> {
        self.tools.get(id)
    }

    pub fn ledgers(&self) -> impl Iterator<Item = &ToolLedger> {
        self.tools.values()
    }

    pub fn contains(&self, id: &ToolId) -> bool {
        self.tools.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Latest `fecha_movimiento` seen so far.
    pub fn last_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.last_recorded_at
    }

    /// Id the next appended movement will receive.
    pub fn next_movement_id(&self) -> MovementId {
        MovementId(self.next_movement_id)
    }

    /// Timestamp for a movement appended at `now`, never earlier than the
    /// previous movement so that time order matches insertion order.
    pub fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_recorded_at {
            Some(last) if last > now => last,
            _ => now,
        }
    }

    fn note_movement(&mut self, movement: &Movement) {
        self.next_movement_id = self.next_movement_id.max(movement.id.0.saturating_add(1));
        self.last_recorded_at = Some(self.next_timestamp(movement.recorded_at));
    }

    fn ledger_mut(&mut self, id: &ToolId, change: &str) -> Option<&mut ToolLedger> {
        let ledger = self.tools.get_mut(id);
        if ledger.is_none() {
            log::warn!("stockfold: {change} for unknown tool {id}, skipped");
        }
        ledger
    }
}

/// Fold one journal entry into the inventory.
///
/// Appending a movement applies its delta to the tool's stock here, in the
/// same step that records the movement.
pub(crate) fn reduce(mut state: Inventory, entry: &Entry) -> Inventory {
    match &entry.change {
        Change::ToolRegistered {
            tool_id,
            name,
            initial_stock,
        } => {
            if state.tools.contains_key(tool_id) {
                log::warn!("stockfold: duplicate registration of tool {tool_id}, skipped");
            } else {
                state.tools.insert(
                    tool_id.clone(),
                    ToolLedger {
                        tool: Tool::registered(tool_id.clone(), name.clone(), *initial_stock),
                        movements: Vec::new(),
                    },
                );
            }
        }
        Change::MovementAppended(movement) => {
            if let Some(ledger) = state.ledger_mut(&movement.tool_id, "movement") {
                ledger.tool.stock = ledger.tool.stock.saturating_add(movement.delta());
                ledger.movements.push(movement.clone());
                state.note_movement(movement);
            }
        }
        Change::StockCorrected { tool_id, stock } => {
            if let Some(ledger) = state.ledger_mut(tool_id, "stock correction") {
                ledger.tool.stock = *stock;
            }
        }
        Change::InitialStockEdited {
            tool_id,
            initial_stock,
            ..
        } => {
            if let Some(ledger) = state.ledger_mut(tool_id, "initial stock edit") {
                ledger.tool.initial_stock = *initial_stock;
            }
        }
        Change::LedgerReset { tool_id, .. } => {
            if let Some(ledger) = state.ledger_mut(tool_id, "ledger reset") {
                ledger.movements.clear();
                ledger.tool.ledger_base = ledger.tool.stock;
            }
        }
        Change::ToolRemoved { tool_id } => {
            state.tools.remove(tool_id);
        }
        // Everything before the header is superseded by the checkpoints
        // that follow it, including lines left in a stale archive.
        Change::Compacted {
            next_movement_id,
            last_recorded_at,
        } => {
            if !state.tools.is_empty() {
                log::debug!(
                    "stockfold: compaction header discards {} tool(s) folded before it",
                    state.tools.len()
                );
            }
            state = Inventory {
                tools: BTreeMap::new(),
                next_movement_id: *next_movement_id,
                last_recorded_at: *last_recorded_at,
            };
        }
        Change::ToolCheckpoint { tool, movements } => {
            for movement in movements {
                state.note_movement(movement);
            }
            state.tools.insert(
                tool.id.clone(),
                ToolLedger {
                    tool: tool.clone(),
                    movements: movements.clone(),
                },
            );
        }
    }
    state
}
