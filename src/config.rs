use crate::journal::LockMode;
use crate::reconcile::Thresholds;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;

/// File-loadable ledger settings. Every field is optional.
///
/// ```
/// use stockfold::{LedgerConfig, LockMode};
///
/// let config = LedgerConfig::from_json_str(
///     r#"{ "max_journal_size": 1048576, "thresholds": { "critical": 5 } }"#,
/// ).unwrap();
/// assert_eq!(config.lock_mode, LockMode::Flock);
/// assert_eq!(config.max_journal_size, Some(1_048_576));
/// assert_eq!(config.thresholds.critical, 5);
/// assert_eq!(config.thresholds.low, 25);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub lock_mode: LockMode,
    /// Rotate the active journal into the archive once it grows past this
    /// many bytes. `None` disables automatic rotation.
    pub max_journal_size: Option<u64>,
    pub thresholds: Thresholds,
    /// Recorded as the actor of every journal entry this ledger writes.
    pub actor: Option<String>,
}

impl LedgerConfig {
    pub fn from_json_str(json: &str) -> io::Result<Self> {
        serde_json::from_str(json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }
}
