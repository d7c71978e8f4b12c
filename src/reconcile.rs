//! Consistency checks between `stock`, `stock_inicial` and the movement history.

use crate::inventory::ToolLedger;
use crate::model::Tool;
use crate::projector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inconsistency surfaced on read. Never repaired automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Stock below zero.
    NegativeStock { stock: i64 },
    /// Stock above `stock_inicial`: an unreviewed overage or an edit that
    /// lowered `stock_inicial`.
    StockAboveInitial { stock: i64, initial_stock: i64 },
    /// Walking the history backward from the stored stock does not land on
    /// the stock the history started from: the stock was changed outside
    /// the ledger, or the ledger is corrupt.
    ReplayDivergence { ledger_base: i64, reconstructed: i64 },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::NegativeStock { stock } => write!(f, "stock is negative ({stock})"),
            Anomaly::StockAboveInitial {
                stock,
                initial_stock,
            } => write!(f, "stock {stock} exceeds initial stock {initial_stock}"),
            Anomaly::ReplayDivergence {
                ledger_base,
                reconstructed,
            } => write!(
                f,
                "history reconstructs an opening stock of {reconstructed}, expected {ledger_base}"
            ),
        }
    }
}

/// Presentation bands for the available percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockBand {
    Critical,
    Low,
    Medium,
    Good,
}

/// Inclusive upper bounds (in percent) of the lower bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub critical: i64,
    pub low: i64,
    pub medium: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            critical: 10,
            low: 25,
            medium: 50,
        }
    }
}

impl Thresholds {
    /// # Examples
    ///
    /// ```
    /// use stockfold::{StockBand, Thresholds};
    ///
    /// let thresholds = Thresholds::default();
    /// assert_eq!(thresholds.classify(10), StockBand::Critical);
    /// assert_eq!(thresholds.classify(11), StockBand::Low);
    /// assert_eq!(thresholds.classify(50), StockBand::Medium);
    /// assert_eq!(thresholds.classify(51), StockBand::Good);
    /// ```
    pub fn classify(&self, percent: i64) -> StockBand {
        if percent <= self.critical {
            StockBand::Critical
        } else if percent <= self.low {
            StockBand::Low
        } else if percent <= self.medium {
            StockBand::Medium
        } else {
            StockBand::Good
        }
    }
}

/// Share of `stock_inicial` still available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    /// `round(100 * stock / stock_inicial)`; `None` when `stock_inicial` is 0.
    pub percent: Option<i64>,
    pub band: Option<StockBand>,
}

impl Availability {
    pub fn of(tool: &Tool, thresholds: &Thresholds) -> Self {
        let percent = percentage(tool.stock, tool.initial_stock);
        Availability {
            percent,
            band: percent.map(|p| thresholds.classify(p)),
        }
    }
}

/// `round(100 * stock / initial_stock)`, half away from zero.
pub(crate) fn percentage(stock: i64, initial_stock: i64) -> Option<i64> {
    if initial_stock <= 0 {
        return None;
    }
    // i128 so that any pair of i64 counters fits.
    let scaled = 100 * i128::from(stock);
    let initial = i128::from(initial_stock);
    let half = initial / 2;
    let rounded = if scaled >= 0 {
        (scaled + half) / initial
    } else {
        (scaled - half) / initial
    };
    Some(i64::try_from(rounded).unwrap_or(if rounded > 0 { i64::MAX } else { i64::MIN }))
}

/// Every anomaly present on `ledger`.
pub(crate) fn anomalies(ledger: &ToolLedger) -> Vec<Anomaly> {
    let tool = &ledger.tool;
    let mut found = Vec::new();

    if tool.stock < 0 {
        found.push(Anomaly::NegativeStock { stock: tool.stock });
    }
    if tool.stock > tool.initial_stock {
        found.push(Anomaly::StockAboveInitial {
            stock: tool.stock,
            initial_stock: tool.initial_stock,
        });
    }

    let reconstructed = projector::opening_stock(tool.stock, &ledger.movements_newest_first());
    if reconstructed != tool.ledger_base {
        found.push(Anomaly::ReplayDivergence {
            ledger_base: tool.ledger_base,
            reconstructed,
        });
    }

    found
}

/// A tool as returned by [`Ledger::get_tool`](crate::Ledger::get_tool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolReport {
    pub tool: Tool,
    pub availability: Availability,
    /// Units issued and not yet returned.
    pub outstanding: i64,
    pub movement_count: usize,
    pub anomalies: Vec<Anomaly>,
}

impl ToolReport {
    pub fn build(ledger: &ToolLedger, thresholds: &Thresholds) -> Self {
        ToolReport {
            tool: ledger.tool.clone(),
            availability: Availability::of(&ledger.tool, thresholds),
            outstanding: ledger.outstanding(),
            movement_count: ledger.movements.len(),
            anomalies: anomalies(ledger),
        }
    }

    pub fn has_anomaly(&self) -> bool {
        !self.anomalies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MAX_STOCK;

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(1, 8), Some(13)); // 12.5
        assert_eq!(percentage(1, 3), Some(33));
        assert_eq!(percentage(2, 3), Some(67));
        assert_eq!(percentage(10, 10), Some(100));
        assert_eq!(percentage(0, 10), Some(0));
        assert_eq!(percentage(12, 10), Some(120));
    }

    #[test]
    fn percentage_undefined_without_initial_stock() {
        assert_eq!(percentage(0, 0), None);
        assert_eq!(percentage(5, 0), None);
    }

    #[test]
    fn negative_stock_rounds_away_from_zero() {
        assert_eq!(percentage(-1, 8), Some(-13));
    }

    #[test]
    fn custom_thresholds() {
        let thresholds = Thresholds {
            critical: 5,
            low: 15,
            medium: 40,
        };
        assert_eq!(thresholds.classify(5), StockBand::Critical);
        assert_eq!(thresholds.classify(10), StockBand::Low);
        assert_eq!(thresholds.classify(41), StockBand::Good);
    }

    #[test]
    fn percentage_of_extreme_counters_saturates() {
        assert_eq!(percentage(i64::MAX, 1), Some(i64::MAX));
        assert_eq!(percentage(i64::MIN, 1), Some(i64::MIN));
        assert_eq!(percentage(i64::MAX, i64::MAX), Some(100));
        assert_eq!(percentage(MAX_STOCK, MAX_STOCK), Some(100));
    }

    #[test]
    fn divergence_is_measured_from_the_start_of_history() {
        use crate::model::{Movement, MovementContext, MovementId, MovementKind, ToolId};
        use chrono::{TimeZone, Utc};

        let movement = |id: u64, kind: MovementKind, quantity: u32| Movement {
            id: MovementId(id),
            tool_id: ToolId::from("T-1"),
            kind,
            quantity,
            recorded_at: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
            reason: kind.default_reason().to_string(),
            context: MovementContext::default(),
            status: None,
        };
        // Issue 4, return 2, then an out-of-band correction from 8 to 3.
        let mut tool = Tool::registered(ToolId::from("T-1"), "Taladro".into(), 10);
        tool.stock = 3;
        let ledger = ToolLedger {
            tool,
            movements: vec![
                movement(0, MovementKind::Salida, 4),
                movement(1, MovementKind::Devolucion, 2),
            ],
        };

        assert_eq!(
            anomalies(&ledger),
            vec![Anomaly::ReplayDivergence {
                ledger_base: 10,
                reconstructed: 5,
            }]
        );
    }
}
