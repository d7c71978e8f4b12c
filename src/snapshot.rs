//! Checkpoints of derived inventory state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// A persisted checkpoint of a view's state.
///
/// Written atomically (via `.tmp` + rename) whenever a view folds new
/// journal lines, so a reopened ledger only replays what came after
/// `offset`. The file is plain JSON:
///
/// ```text
/// $ jq '.offset, .hash' views/inventory.snapshot.json
/// 8412
/// "5be10d3a0c77e2f4"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Snapshot<S> {
    /// The derived state at the time of the snapshot.
    pub state: S,

    /// Byte offset into `journal.jsonl` after the last entry folded.
    /// Always refers to the active journal; a snapshot that exists has
    /// already consumed everything in the archive.
    pub offset: u64,

    /// Hex-encoded xxh64 hash of the last journal line folded.
    pub hash: String,
}

impl<S> Snapshot<S> {
    pub fn new(state: S, offset: u64, hash: String) -> Self {
        Snapshot {
            state,
            offset,
            hash,
        }
    }
}

/// Save a snapshot atomically to disk.
///
/// If the process crashes mid-write, the previous snapshot survives intact.
pub fn save<S: Serialize>(path: &Path, snapshot: &Snapshot<S>) -> io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    let json = serde_json::to_string(snapshot)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_data()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a snapshot from disk.
///
/// A missing or undecodable snapshot yields `Ok(None)`, which makes the
/// caller rebuild from the journal.
pub fn load<S: DeserializeOwned>(path: &Path) -> io::Result<Option<Snapshot<S>>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    match serde_json::from_str(&contents) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            log::warn!("stockfold: ignoring unreadable snapshot {}: {e}", path.display());
            Ok(None)
        }
    }
}

/// Delete a snapshot file and its `.tmp` file if present. Idempotent.
pub fn delete(path: &Path) -> io::Result<()> {
    remove_if_exists(path)?;
    remove_if_exists(&path.with_extension("json.tmp"))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
