//! Acceptance rules for proposed movements.

use crate::error::LedgerError;
use crate::model::{MAX_STOCK, MovementContext, MovementKind, MovementStatus, Tool};
use crate::projector;

/// A proposed movement as it arrives from a caller.
///
/// The kind is kept as raw text and the quantity as a signed integer so
/// that malformed input is rejected by [`validate`] with a precise error
/// instead of failing to deserialize somewhere upstream.
///
/// # Examples
///
/// ```
/// use stockfold::{MovementKind, MovementRequest, MovementStatus};
///
/// let request = MovementRequest::new(MovementKind::Salida, 4)
///     .reason("prestamo")
///     .project("Obra Norte")
///     .receiver("Cuadrilla 2")
///     .status(MovementStatus::Activo);
/// assert_eq!(request.kind, "salida");
/// assert_eq!(request.context.project.as_deref(), Some("Obra Norte"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub kind: String,
    pub quantity: i64,
    pub reason: Option<String>,
    pub context: MovementContext,
    pub status: Option<MovementStatus>,
}

impl MovementRequest {
    pub fn new(kind: impl ToString, quantity: i64) -> Self {
        MovementRequest {
            kind: kind.to_string(),
            quantity,
            reason: None,
            context: MovementContext::default(),
            status: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.context.project = Some(project.into());
        self
    }

    pub fn responsible(mut self, responsible: impl Into<String>) -> Self {
        self.context.responsible = Some(responsible.into());
        self
    }

    pub fn receiver(mut self, receiver: impl Into<String>) -> Self {
        self.context.receiver = Some(receiver.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.context.notes = Some(notes.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.context.details = Some(details.into());
        self
    }

    pub fn status(mut self, status: MovementStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// A request that passed validation against a tool's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedMovement {
    pub kind: MovementKind,
    pub quantity: u32,
    pub reason: String,
    /// Stock the tool will hold once the movement is appended.
    pub resulting_stock: i64,
    /// Set when this movement raises stock above `stock_inicial`: the
    /// number of units by which the resulting stock exceeds it.
    pub overage: Option<i64>,
}

/// Decide whether `request` may be appended to `tool`'s ledger.
///
/// Pure: nothing is written. Checks, in order, that the quantity is a
/// positive integer, that the kind belongs to the closed vocabulary, and
/// that the resulting stock stays between zero and [`MAX_STOCK`]. Falling below
/// `stock_inicial` is normal use and never rejected; rising above it is
/// accepted and reported through [`AcceptedMovement::overage`].
pub fn validate(tool: &Tool, request: &MovementRequest) -> Result<AcceptedMovement, LedgerError> {
    let quantity = u32::try_from(request.quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or(LedgerError::InvalidQuantity(request.quantity))?;

    let kind: MovementKind = request.kind.parse()?;

    let resulting_stock = projector::forward(tool.stock, kind, quantity)
        .filter(|stock| *stock <= MAX_STOCK)
        .ok_or_else(|| LedgerError::StockOutOfRange {
            tool_id: tool.id.clone(),
            kind,
            available: tool.stock,
            requested: quantity,
        })?;
    if resulting_stock < 0 {
        return Err(LedgerError::StockViolation {
            tool_id: tool.id.clone(),
            kind,
            available: tool.stock,
            requested: quantity,
            resulting: resulting_stock,
        });
    }

    let overage = (resulting_stock > tool.initial_stock
        && resulting_stock > tool.stock)
        .then(|| resulting_stock.saturating_sub(tool.initial_stock));

    let reason = request
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(kind.default_reason())
        .to_string();

    Ok(AcceptedMovement {
        kind,
        quantity,
        reason,
        resulting_stock,
        overage,
    })
}
