use crate::model::{Movement, Tool, ToolId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the journal: a single atomic change to the inventory.
///
/// Entries are serialized as single JSON lines in `journal.jsonl`. Every
/// piece of derived state (tools, their stock counters, their movement
/// history) is a fold over these entries, so a change is either fully
/// present in the journal or absent.
///
/// # Examples
///
/// ```
/// use stockfold::{Change, Entry, ToolId};
///
/// let entry = Entry::new(Change::ToolRemoved { tool_id: ToolId::from("T-1") })
///     .with_actor("admin");
/// assert_eq!(entry.actor.as_deref(), Some("admin"));
///
/// let json = serde_json::to_string(&entry).unwrap();
/// assert!(json.contains(r#""type":"tool_removed""#));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct Entry {
    /// When the change was written.
    pub ts: DateTime<Utc>,

    /// Who caused the change (user id, service name). Application-defined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    pub change: Change,
}

impl Entry {
    /// Create an entry stamped with the current time and no actor.
    pub fn new(change: Change) -> Self {
        Entry {
            ts: Utc::now(),
            actor: None,
            change,
        }
    }

    /// Set the actor that caused this change.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Override the timestamp.
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }
}

/// The closed set of journal changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Change {
    /// A new tool with `stock = stock_inicial`.
    ToolRegistered {
        tool_id: ToolId,
        name: String,
        #[serde(rename = "stock_inicial")]
        initial_stock: i64,
    },

    /// A validated movement. Folding it applies its delta to the tool's
    /// stock, so movement and stock change land in the same line.
    MovementAppended(Movement),

    /// Administrative stock correction outside the movement history.
    StockCorrected { tool_id: ToolId, stock: i64 },

    /// Administrative edit of `stock_inicial`.
    InitialStockEdited {
        tool_id: ToolId,
        #[serde(rename = "stock_inicial")]
        initial_stock: i64,
        /// Set when the new value is below the outstanding quantity and the
        /// editor acknowledged it.
        #[serde(default)]
        override_acknowledged: bool,
    },

    /// All movements of the tool were cleared.
    LedgerReset { tool_id: ToolId, removed: usize },

    /// The tool and its movements were destroyed.
    ToolRemoved { tool_id: ToolId },

    /// Header written by compaction. Restores the movement id counter and
    /// the timestamp floor for new movements.
    Compacted {
        next_movement_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_recorded_at: Option<DateTime<Utc>>,
    },

    /// Full state of one tool, written by compaction.
    ToolCheckpoint {
        tool: Tool,
        movements: Vec<Movement>,
    },
}

impl Change {
    /// The tool this change applies to, if any.
    pub fn tool_id(&self) -> Option<&ToolId> {
        match self {
            Change::ToolRegistered { tool_id, .. }
            | Change::StockCorrected { tool_id, .. }
            | Change::InitialStockEdited { tool_id, .. }
            | Change::LedgerReset { tool_id, .. }
            | Change::ToolRemoved { tool_id } => Some(tool_id),
            Change::MovementAppended(movement) => Some(&movement.tool_id),
            Change::ToolCheckpoint { tool, .. } => Some(&tool.id),
            Change::Compacted { .. } => None,
        }
    }
}
