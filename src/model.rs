//! Tools, movements and the closed movement-kind vocabulary.

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identifier of a physical tool.
///
/// Callers provide their own ids (inventory codes, database keys, uuids).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolId(String);

impl ToolId {
    pub fn new(id: impl Into<String>) -> Self {
        ToolId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ToolId {
    fn from(id: &str) -> Self {
        ToolId(id.to_string())
    }
}

impl From<String> for ToolId {
    fn from(id: String) -> Self {
        ToolId(id)
    }
}

/// Largest value a stock counter may hold.
///
/// Keeps every stock computation (forward updates, backward walks,
/// percentages) far from `i64` overflow.
pub const MAX_STOCK: i64 = 1_000_000_000_000_000;

/// Identifier of a movement, assigned by the ledger at append time.
///
/// Ids come from a single counter per store and are never reused, so they
/// also encode insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub u64);

impl fmt::Display for MovementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a movement adds to or removes from the available stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

/// The closed set of movement kinds (`tipo_movimiento`).
///
/// # Examples
///
/// ```
/// use stockfold::{Direction, MovementKind};
///
/// let kind: MovementKind = "Devolución".parse().unwrap();
/// assert_eq!(kind, MovementKind::Devolucion);
/// assert_eq!(kind.direction(), Direction::Increase);
/// assert!("prestamo".parse::<MovementKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Intake: purchased or otherwise received units.
    Entrada,
    /// Issue: units handed out (loans, project assignments).
    Salida,
    /// Return of previously issued units.
    Devolucion,
    /// Write-off: lost, broken or retired units.
    Baja,
}

impl MovementKind {
    pub const ALL: [MovementKind; 4] = [
        MovementKind::Entrada,
        MovementKind::Salida,
        MovementKind::Devolucion,
        MovementKind::Baja,
    ];

    /// The fixed effect of this kind on stock.
    pub fn direction(self) -> Direction {
        match self {
            MovementKind::Entrada | MovementKind::Devolucion => Direction::Increase,
            MovementKind::Salida | MovementKind::Baja => Direction::Decrease,
        }
    }

    /// Reason code used when a movement is recorded without one.
    pub fn default_reason(self) -> &'static str {
        match self {
            MovementKind::Entrada => "compra",
            MovementKind::Salida => "prestamo",
            MovementKind::Devolucion => "devolucion",
            MovementKind::Baja => "perdida",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Entrada => "entrada",
            MovementKind::Salida => "salida",
            MovementKind::Devolucion => "devolucion",
            MovementKind::Baja => "baja",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entrada" => Ok(MovementKind::Entrada),
            "salida" => Ok(MovementKind::Salida),
            "devolucion" | "devolución" => Ok(MovementKind::Devolucion),
            "baja" => Ok(MovementKind::Baja),
            _ => Err(LedgerError::UnknownMovementKind(s.to_string())),
        }
    }
}

/// Lifecycle tag of a movement (`estado_movimiento`).
///
/// Purely descriptive. Resolving an open loan is recorded as a new
/// movement, never by editing this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementStatus {
    Activo,
    Completado,
    Cancelado,
}

/// Descriptive associations of a movement. None of these affect stock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl MovementContext {
    pub fn is_empty(&self) -> bool {
        *self == MovementContext::default()
    }
}

/// An immutable stock movement of one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Movement {
    pub id: MovementId,
    pub tool_id: ToolId,

    #[serde(rename = "tipo_movimiento")]
    pub kind: MovementKind,

    /// Always positive; the sign comes from `kind`.
    #[serde(rename = "cantidad")]
    pub quantity: u32,

    #[serde(rename = "fecha_movimiento")]
    pub recorded_at: DateTime<Utc>,

    /// Display/reporting vocabulary (`compra`, `prestamo`, `perdida`, ...).
    #[serde(rename = "razon_movimiento")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "MovementContext::is_empty")]
    pub context: MovementContext,

    #[serde(
        rename = "estado_movimiento",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<MovementStatus>,
}

impl Movement {
    /// Signed effect of this movement on stock.
    pub fn delta(&self) -> i64 {
        crate::projector::delta(self.kind, self.quantity)
    }
}

/// A tool and its stock counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Tool {
    pub id: ToolId,
    pub name: String,

    /// Quantity originally registered (`stock_inicial`).
    #[serde(rename = "stock_inicial")]
    pub initial_stock: i64,

    /// Quantity currently available.
    pub stock: i64,

    /// Stock value at which the current movement history starts: the
    /// initial stock at registration, or the stock at the last reset.
    pub ledger_base: i64,
}

impl Tool {
    pub(crate) fn registered(id: ToolId, name: String, initial_stock: i64) -> Self {
        Tool {
            id,
            name,
            initial_stock,
            stock: initial_stock,
            ledger_base: initial_stock,
        }
    }
}
