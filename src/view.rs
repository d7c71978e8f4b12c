use crate::entry::Entry;
use crate::journal::JournalReader;
use crate::snapshot::{self, Snapshot};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::{Path, PathBuf};

/// A pure function that folds a journal entry into state.
///
/// Reducers receive owned state and return owned state. They must not do
/// I/O and must tolerate entries they cannot apply.
///
/// # Examples
///
/// ```
/// use stockfold::{Change, Entry, ReduceFn};
///
/// fn movement_count(state: u64, entry: &Entry) -> u64 {
///     match entry.change {
///         Change::MovementAppended(_) => state + 1,
///         _ => state,
///     }
/// }
///
/// let reducer: ReduceFn<u64> = movement_count;
/// ```
pub type ReduceFn<S> = fn(S, &Entry) -> S;

/// A derived view over the journal.
///
/// Owns a reducer, checkpoints its state to `views/<name>.snapshot.json`
/// and refreshes incrementally from the active journal.
pub struct View<S> {
    name: String,
    reducer: ReduceFn<S>,
    snapshot_path: PathBuf,
    state: S,
    offset: u64,
    hash: String,
    loaded: bool,
    needs_full_replay: bool,
}

impl<S: std::fmt::Debug> std::fmt::Debug for View<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("snapshot_path", &self.snapshot_path)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<S> View<S>
where
    S: Serialize + DeserializeOwned + Default + Clone,
{
    /// Create a new view. `name` is used for the snapshot filename.
    pub fn new(name: &str, reducer: ReduceFn<S>, views_dir: &Path) -> Self {
        let snapshot_path = views_dir.join(format!("{name}.snapshot.json"));
        View {
            name: name.to_string(),
            reducer,
            snapshot_path,
            state: S::default(),
            offset: 0,
            hash: String::new(),
            loaded: false,
            needs_full_replay: false,
        }
    }

    /// Bring the view up to date with the journal.
    ///
    /// On first call, loads the snapshot if one exists and verifies it
    /// against the journal; without a usable snapshot the archive and the
    /// active journal are replayed in full. Afterwards only lines past the
    /// current offset are folded. A new snapshot is saved whenever anything
    /// was folded.
    pub fn refresh(&mut self, reader: &JournalReader) -> io::Result<&S> {
        if !self.loaded {
            match snapshot::load::<S>(&self.snapshot_path)? {
                Some(snap) => {
                    self.state = snap.state;
                    self.offset = snap.offset;
                    self.hash = snap.hash;
                }
                None => self.needs_full_replay = true,
            }
            self.loaded = true;

            if self.offset > 0 {
                match self.verify_snapshot(reader)? {
                    SnapshotValidity::Valid => {}
                    SnapshotValidity::OffsetBeyondEof => {
                        log::warn!(
                            "stockfold: view '{}': snapshot offset {} is beyond journal EOF, rebuilding",
                            self.name,
                            self.offset
                        );
                        self.discard();
                    }
                    SnapshotValidity::HashMismatch => {
                        log::warn!(
                            "stockfold: view '{}': snapshot hash mismatch, rebuilding",
                            self.name
                        );
                        self.discard();
                    }
                }
            }
        }

        let mut state = std::mem::take(&mut self.state);
        let mut new_offset = self.offset;
        let mut new_hash = self.hash.clone();
        let mut processed = false;

        // Archived lines carry no offset; the active journal is then read
        // from its start so offset and hash always describe it.
        if self.needs_full_replay {
            self.needs_full_replay = false;
            for result in reader.read_archived()? {
                let (entry, _) = result?;
                state = (self.reducer)(state, &entry);
                processed = true;
            }
        }

        for result in reader.read_from(new_offset)? {
            let (entry, next_offset, line_hash) = result?;
            state = (self.reducer)(state, &entry);
            new_offset = next_offset;
            new_hash = line_hash;
            processed = true;
        }

        self.state = state;

        if processed {
            self.offset = new_offset;
            self.hash = new_hash;
            self.save()?;
        }

        Ok(&self.state)
    }

    /// Delete the snapshot and replay the full history.
    pub fn rebuild(&mut self, reader: &JournalReader) -> io::Result<&S> {
        snapshot::delete(&self.snapshot_path)?;
        self.discard();
        self.loaded = true;
        self.refresh(reader)
    }

    /// Point the view at the start of a freshly truncated journal, keeping
    /// its state. Used after rotation.
    pub fn reset_offset(&mut self) -> io::Result<()> {
        self.offset = 0;
        self.hash = String::new();
        self.save()
    }

    /// Current in-memory state. No I/O.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Byte offset in the active journal just past the last folded line.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Hash of the last folded line in the active journal (empty at offset 0).
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn discard(&mut self) {
        self.state = S::default();
        self.offset = 0;
        self.hash = String::new();
        self.needs_full_replay = true;
    }

    fn save(&self) -> io::Result<()> {
        snapshot::save(
            &self.snapshot_path,
            &Snapshot::new(self.state.clone(), self.offset, self.hash.clone()),
        )
    }

    fn verify_snapshot(&self, reader: &JournalReader) -> io::Result<SnapshotValidity> {
        let file_size = reader.active_log_size()?;

        if self.offset > file_size {
            return Ok(SnapshotValidity::OffsetBeyondEof);
        }

        match reader.read_line_hash_before(self.offset)? {
            Some(hash) if hash == self.hash => Ok(SnapshotValidity::Valid),
            Some(_) => Ok(SnapshotValidity::HashMismatch),
            None => Ok(SnapshotValidity::Valid),
        }
    }
}

enum SnapshotValidity {
    Valid,
    OffsetBeyondEof,
    HashMismatch,
}
