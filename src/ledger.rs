use crate::config::LedgerConfig;
use crate::entry::{Change, Entry};
use crate::error::LedgerError;
use crate::inventory::{self, Inventory, ToolLedger};
use crate::journal::{ConditionalAppendError, Journal, JournalReader, LockMode};
use crate::model::{MAX_STOCK, Movement, Tool, ToolId};
use crate::projector::StockTimeline;
use crate::reconcile::{Thresholds, ToolReport};
use crate::validate::{self, MovementRequest};
use crate::view::View;
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};

const INVENTORY_VIEW: &str = "inventory";

/// Acknowledgement that a tool's movement history may be erased.
///
/// Constructing one is the human confirmation step; the transport layer
/// should only do so after the operator explicitly confirmed the reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetConfirmation {
    tool_id: ToolId,
}

impl ResetConfirmation {
    pub fn confirm(tool_id: impl Into<ToolId>) -> Self {
        ResetConfirmation {
            tool_id: tool_id.into(),
        }
    }

    pub fn tool_id(&self) -> &ToolId {
        &self.tool_id
    }
}

/// Result of [`Ledger::reset_ledger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The given number of movements were removed.
    Cleared { removed: usize },
    /// The tool had no movements; nothing was written.
    NothingToReset,
}

/// Whether lowering `stock_inicial` below the issued-but-unreturned
/// quantity is allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutstandingOverride {
    #[default]
    Refuse,
    Acknowledge,
}

/// Builder for configuring a [`Ledger`] before opening it.
#[must_use]
pub struct LedgerBuilder {
    dir: PathBuf,
    config: LedgerConfig,
}

impl LedgerBuilder {
    /// Replace every setting with the ones in `config`.
    pub fn config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.config.lock_mode = mode;
        self
    }

    /// Rotate the active journal into the archive once it exceeds `bytes`.
    pub fn max_journal_size(mut self, bytes: u64) -> Self {
        self.config.max_journal_size = Some(bytes);
        self
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.config.actor = Some(actor.into());
        self
    }

    /// Open the store, creating it if needed, and bring the inventory up to
    /// date with the journal.
    pub fn open(self) -> io::Result<Ledger> {
        let journal = Journal::open_with_lock(&self.dir, self.config.lock_mode)?;
        let reader = journal.reader();
        let mut view = View::new(INVENTORY_VIEW, inventory::reduce, journal.views_dir());
        view.refresh(&reader)?;

        log::debug!(
            "stockfold: opened {} with {} tool(s)",
            self.dir.display(),
            view.state().len()
        );

        Ok(Ledger {
            journal,
            reader,
            view,
            config: self.config,
        })
    }
}

/// The tool-inventory movement ledger.
///
/// Every write is a single journal line: a movement and the stock change
/// it causes are one fold step, so neither can be persisted without the
/// other. With the default [`LockMode::Flock`] only one `Ledger` per
/// directory can be open, which serializes all writers; `&mut self` on
/// writes serializes callers within the process.
///
/// # Examples
///
/// ```
/// use stockfold::{Ledger, MovementKind, MovementRequest, ToolId};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut ledger = Ledger::open(dir.path()).unwrap();
/// let drill = ToolId::from("T-001");
///
/// ledger.register_tool(drill.clone(), "Taladro percutor", 10).unwrap();
/// ledger
///     .append_movement(&drill, MovementRequest::new(MovementKind::Salida, 4).reason("prestamo"))
///     .unwrap();
/// ledger
///     .append_movement(&drill, MovementRequest::new(MovementKind::Devolucion, 2))
///     .unwrap();
///
/// let timeline = ledger.stock_timeline(&drill).unwrap();
/// let after: Vec<i64> = timeline.entries.iter().map(|e| e.stock_after).collect();
/// assert_eq!(after, vec![8, 6]);
/// assert_eq!(ledger.get_tool(&drill).unwrap().tool.stock, 8);
/// ```
pub struct Ledger {
    journal: Journal,
    reader: JournalReader,
    view: View<Inventory>,
    config: LedgerConfig,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("dir", &self.journal.dir())
            .field("tools", &self.view.state().len())
            .field("config", &self.config)
            .finish()
    }
}

impl Ledger {
    /// Open or create a ledger with default settings.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        Self::builder(dir).open()
    }

    pub fn builder(dir: impl AsRef<Path>) -> LedgerBuilder {
        LedgerBuilder {
            dir: dir.as_ref().to_path_buf(),
            config: LedgerConfig::default(),
        }
    }

    /// Register a new tool with `stock = stock_inicial = initial_stock`.
    pub fn register_tool(
        &mut self,
        tool_id: impl Into<ToolId>,
        name: impl Into<String>,
        initial_stock: i64,
    ) -> Result<Tool, LedgerError> {
        let tool_id = tool_id.into();
        check_stock(initial_stock)?;
        if self.inventory().contains(&tool_id) {
            return Err(LedgerError::DuplicateTool(tool_id));
        }

        self.commit(Change::ToolRegistered {
            tool_id: tool_id.clone(),
            name: name.into(),
            initial_stock,
        })?;
        log::info!("stockfold: registered tool {tool_id} with initial stock {initial_stock}");

        Ok(self.tool_ledger(&tool_id)?.tool.clone())
    }

    /// Validate and append a movement, updating the tool's stock in the same
    /// journal line.
    ///
    /// Rejected requests write nothing. A movement that lifts stock above
    /// `stock_inicial` is accepted and logged; [`get_tool`](Self::get_tool)
    /// reports it as [`Anomaly::StockAboveInitial`](crate::Anomaly::StockAboveInitial).
    ///
    /// [`LedgerError::AppliedWithoutRefresh`] means the movement is recorded;
    /// retrying it would record it twice.
    pub fn append_movement(
        &mut self,
        tool_id: &ToolId,
        request: MovementRequest,
    ) -> Result<Movement, LedgerError> {
        let tool = &self.tool_ledger(tool_id)?.tool;
        let accepted = validate::validate(tool, &request)?;

        if let Some(overage) = accepted.overage {
            log::warn!(
                "stockfold: tool {tool_id}: {} of {} lifts stock to {}, {overage} above initial stock {}; flagged for review",
                accepted.kind,
                accepted.quantity,
                accepted.resulting_stock,
                tool.initial_stock
            );
        }

        let inventory = self.inventory();
        let movement = Movement {
            id: inventory.next_movement_id(),
            tool_id: tool_id.clone(),
            kind: accepted.kind,
            quantity: accepted.quantity,
            recorded_at: inventory.next_timestamp(Utc::now()),
            reason: accepted.reason,
            context: request.context,
            status: request.status,
        };

        self.commit(Change::MovementAppended(movement.clone()))?;
        log::debug!(
            "stockfold: tool {tool_id}: {} {} {} ({}), stock now {}",
            movement.id,
            movement.kind,
            movement.quantity,
            movement.reason,
            accepted.resulting_stock
        );

        Ok(movement)
    }

    /// The tool's movements, newest first.
    pub fn list_movements(&self, tool_id: &ToolId) -> Result<Vec<Movement>, LedgerError> {
        Ok(self.tool_ledger(tool_id)?.movements_newest_first())
    }

    /// Annotate every movement with the stock it left behind, walking
    /// backward from the current stock. Recomputed on every call.
    pub fn stock_timeline(&self, tool_id: &ToolId) -> Result<StockTimeline, LedgerError> {
        let ledger = self.tool_ledger(tool_id)?;
        Ok(StockTimeline::build(
            tool_id.clone(),
            ledger.tool.stock,
            &ledger.movements_newest_first(),
        ))
    }

    /// Erase the tool's whole movement history.
    ///
    /// `stock` and `stock_inicial` are untouched; the current stock becomes
    /// the base the next history starts from.
    pub fn reset_ledger(
        &mut self,
        confirmation: ResetConfirmation,
    ) -> Result<ResetOutcome, LedgerError> {
        let tool_id = confirmation.tool_id;
        let removed = self.tool_ledger(&tool_id)?.movements.len();
        if removed == 0 {
            log::debug!("stockfold: tool {tool_id}: nothing to reset");
            return Ok(ResetOutcome::NothingToReset);
        }

        self.commit(Change::LedgerReset {
            tool_id: tool_id.clone(),
            removed,
        })?;
        log::info!("stockfold: tool {tool_id}: ledger reset, {removed} movement(s) removed");

        Ok(ResetOutcome::Cleared { removed })
    }

    /// The tool with its availability, outstanding quantity and any
    /// reconciliation anomalies.
    pub fn get_tool(&self, tool_id: &ToolId) -> Result<ToolReport, LedgerError> {
        Ok(ToolReport::build(
            self.tool_ledger(tool_id)?,
            &self.config.thresholds,
        ))
    }

    /// Like [`get_tool`](Self::get_tool), but fails with
    /// [`LedgerError::ReconciliationAnomaly`] when anything is off.
    pub fn verify_tool(&self, tool_id: &ToolId) -> Result<ToolReport, LedgerError> {
        let report = self.get_tool(tool_id)?;
        if report.has_anomaly() {
            return Err(LedgerError::ReconciliationAnomaly {
                tool_id: tool_id.clone(),
                anomalies: report.anomalies,
            });
        }
        Ok(report)
    }

    /// Reports of every tool that has at least one anomaly.
    pub fn audit(&self) -> Vec<ToolReport> {
        let flagged: Vec<ToolReport> = self
            .inventory()
            .ledgers()
            .map(|ledger| ToolReport::build(ledger, &self.config.thresholds))
            .filter(ToolReport::has_anomaly)
            .collect();

        for report in &flagged {
            for anomaly in &report.anomalies {
                log::warn!("stockfold: tool {}: {anomaly}", report.tool.id);
            }
        }
        flagged
    }

    /// All tools, ordered by id.
    pub fn list_tools(&self) -> Vec<&Tool> {
        self.inventory().ledgers().map(|ledger| &ledger.tool).collect()
    }

    /// Overwrite the current stock outside the movement history.
    ///
    /// The history is left as is, so until the next reset the tool reports
    /// a [`ReplayDivergence`](crate::Anomaly::ReplayDivergence).
    pub fn correct_stock(&mut self, tool_id: &ToolId, stock: i64) -> Result<Tool, LedgerError> {
        check_stock(stock)?;
        let previous = self.tool_ledger(tool_id)?.tool.stock;

        self.commit(Change::StockCorrected {
            tool_id: tool_id.clone(),
            stock,
        })?;
        log::warn!("stockfold: tool {tool_id}: stock corrected from {previous} to {stock}");

        Ok(self.tool_ledger(tool_id)?.tool.clone())
    }

    /// Change `stock_inicial`.
    ///
    /// Refuses to go below the quantity currently issued and not returned
    /// unless the override is acknowledged.
    pub fn edit_initial_stock(
        &mut self,
        tool_id: &ToolId,
        initial_stock: i64,
        override_outstanding: OutstandingOverride,
    ) -> Result<Tool, LedgerError> {
        check_stock(initial_stock)?;
        let outstanding = self.tool_ledger(tool_id)?.outstanding();
        let below_outstanding = initial_stock < outstanding;
        if below_outstanding && override_outstanding == OutstandingOverride::Refuse {
            return Err(LedgerError::OutstandingExceedsInitial {
                tool_id: tool_id.clone(),
                requested: initial_stock,
                outstanding,
            });
        }

        self.commit(Change::InitialStockEdited {
            tool_id: tool_id.clone(),
            initial_stock,
            override_acknowledged: below_outstanding,
        })?;
        if below_outstanding {
            log::warn!(
                "stockfold: tool {tool_id}: initial stock set to {initial_stock} below {outstanding} outstanding (override acknowledged)"
            );
        } else {
            log::info!("stockfold: tool {tool_id}: initial stock set to {initial_stock}");
        }

        Ok(self.tool_ledger(tool_id)?.tool.clone())
    }

    /// Destroy a tool together with its movements. Returns how many
    /// movements went with it.
    pub fn remove_tool(&mut self, tool_id: &ToolId) -> Result<usize, LedgerError> {
        let removed = self.tool_ledger(tool_id)?.movements.len();
        self.commit(Change::ToolRemoved {
            tool_id: tool_id.clone(),
        })?;
        log::info!("stockfold: removed tool {tool_id} and {removed} movement(s)");
        Ok(removed)
    }

    /// Fold entries written by other writers sharing the directory
    /// (only possible with [`LockMode::None`]).
    pub fn refresh(&mut self) -> Result<(), LedgerError> {
        self.view.refresh(&self.reader)?;
        Ok(())
    }

    /// Move the active journal into the compressed archive.
    pub fn rotate(&mut self) -> Result<(), LedgerError> {
        self.view.refresh(&self.reader)?;
        let size = self.journal.active_log_size()?;
        self.journal.rotate()?;
        self.view.reset_offset()?;
        log::info!("stockfold: rotated {size} byte(s) of journal into the archive");
        Ok(())
    }

    /// Rewrite the store so that it holds only live state.
    ///
    /// Movements erased by resets or tool removal, and the archive, are
    /// physically deleted. Stock counters, `ledger_base` values, live
    /// movements and the movement id counter are preserved exactly.
    pub fn compact(&mut self) -> Result<(), LedgerError> {
        self.view.refresh(&self.reader)?;
        let inventory = self.inventory();

        let stamp = |change| self.entry(change);
        let mut entries = vec![stamp(Change::Compacted {
            next_movement_id: inventory.next_movement_id().0,
            last_recorded_at: inventory.last_recorded_at(),
        })];
        entries.extend(inventory.ledgers().map(|ledger| {
            stamp(Change::ToolCheckpoint {
                tool: ledger.tool.clone(),
                movements: ledger.movements.clone(),
            })
        }));

        let before = self.view.state().clone();
        self.journal.replace_all(&entries)?;
        self.view.rebuild(&self.reader)?;

        if *self.view.state() != before {
            log::warn!("stockfold: compacted state differs from the state before compaction");
        }
        log::info!(
            "stockfold: compacted journal to {} tool checkpoint(s)",
            entries.len() - 1
        );
        Ok(())
    }

    /// Current derived state.
    pub fn inventory(&self) -> &Inventory {
        self.view.state()
    }

    pub fn dir(&self) -> &Path {
        self.journal.dir()
    }

    pub fn reader(&self) -> &JournalReader {
        &self.reader
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn tool_ledger(&self, tool_id: &ToolId) -> Result<&ToolLedger, LedgerError> {
        self.inventory()
            .ledger(tool_id)
            .ok_or_else(|| LedgerError::UnknownTool(tool_id.clone()))
    }

    fn entry(&self, change: Change) -> Entry {
        let entry = Entry::new(change);
        match &self.config.actor {
            Some(actor) => entry.with_actor(actor.clone()),
            None => entry,
        }
    }

    /// Append one change, guarded by the view's position, and fold it.
    ///
    /// Once the line is in the journal the change counts as applied: a
    /// failed refresh is reported as [`LedgerError::AppliedWithoutRefresh`]
    /// and a failed automatic rotation is only logged.
    fn commit(&mut self, change: Change) -> Result<(), LedgerError> {
        let entry = self.entry(change);
        self.journal
            .append_if(&entry, self.view.offset(), self.view.hash())
            .map_err(|e| match e {
                ConditionalAppendError::Conflict(conflict) => LedgerError::Conflict {
                    expected_offset: conflict.expected_offset,
                    actual_offset: conflict.actual_offset,
                },
                ConditionalAppendError::Io(e) => LedgerError::Storage(e),
            })?;
        self.view
            .refresh(&self.reader)
            .map_err(LedgerError::AppliedWithoutRefresh)?;

        if let Some(max) = self.config.max_journal_size {
            if let Err(e) = self.rotate_if_above(max) {
                log::warn!("stockfold: automatic rotation failed, journal left in place: {e}");
            }
        }
        Ok(())
    }

    fn rotate_if_above(&mut self, max: u64) -> Result<(), LedgerError> {
        if self.journal.active_log_size()? > max {
            self.rotate()?;
        }
        Ok(())
    }
}

fn check_stock(stock: i64) -> Result<(), LedgerError> {
    if (0..=MAX_STOCK).contains(&stock) {
        Ok(())
    } else {
        Err(LedgerError::InvalidStock(stock))
    }
}
