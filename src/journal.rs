use crate::archive;
use crate::entry::Entry;
use fs2::FileExt;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub(crate) const JOURNAL_FILE: &str = "journal.jsonl";
pub(crate) const ARCHIVE_FILE: &str = "archive.jsonl.zst";
pub(crate) const LOCK_FILE: &str = "ledger.lock";
pub(crate) const VIEWS_DIR: &str = "views";

/// Compute xxh64 hash of raw line bytes (without trailing newline), hex-encoded.
pub fn line_hash(line: &[u8]) -> String {
    let hash = xxhash_rust::xxh64::xxh64(line, 0);
    format!("{:016x}", hash)
}

/// How a writer guards the store against other writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Exclusive advisory lock on `ledger.lock`, held until the writer drops.
    #[default]
    Flock,
    /// No lock. Concurrent writers are detected by conditional appends only.
    None,
}

/// Where an appended line landed in the active journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendResult {
    /// Byte offset where the line starts.
    pub start_offset: u64,
    /// Byte offset just past the trailing newline.
    pub end_offset: u64,
    /// xxh64 of the written line.
    pub line_hash: String,
}

/// The journal did not end where the caller expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendConflict {
    pub expected_offset: u64,
    pub actual_offset: u64,
    pub expected_hash: String,
    /// Only populated when the offsets matched but the last line differs.
    pub actual_hash: Option<String>,
}

#[derive(Debug)]
pub enum ConditionalAppendError {
    Conflict(AppendConflict),
    Io(io::Error),
}

impl fmt::Display for ConditionalAppendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionalAppendError::Conflict(c) => write!(
                f,
                "journal conflict: expected end offset {} (hash '{}'), found {}",
                c.expected_offset, c.expected_hash, c.actual_offset
            ),
            ConditionalAppendError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConditionalAppendError {}

impl From<io::Error> for ConditionalAppendError {
    fn from(e: io::Error) -> Self {
        ConditionalAppendError::Io(e)
    }
}

/// Read-only access to a journal directory.
///
/// Cheap to create and safe to use while a writer holds the lock.
#[derive(Debug, Clone)]
pub struct JournalReader {
    log_path: PathBuf,
    archive_path: PathBuf,
}

impl JournalReader {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        JournalReader {
            log_path: dir.join(JOURNAL_FILE),
            archive_path: dir.join(ARCHIVE_FILE),
        }
    }

    /// Read entries from the active journal starting at the given byte offset.
    ///
    /// Yields `(entry, next_byte_offset, line_hash)` for each complete line.
    /// Empty lines are skipped. A partial last line (missing trailing
    /// newline, i.e. a crash mid-write) is skipped silently.
    pub fn read_from(
        &self,
        offset: u64,
    ) -> io::Result<impl Iterator<Item = io::Result<(Entry, u64, String)>> + use<>> {
        let mut file = match File::open(&self.log_path) {
            Ok(file) => Some(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        let file_len = match &mut file {
            Some(file) => {
                file.seek(SeekFrom::Start(offset))?;
                file.metadata()?.len()
            }
            None => 0,
        };

        Ok(EntryIterator {
            lines: file.map(|f| BufReader::new(f).lines()),
            pos: offset,
            file_len,
        })
    }

    /// Read the entries rotated into the compressed archive, oldest first.
    ///
    /// Yields `(entry, line_hash)`. Empty when nothing was rotated yet.
    pub fn read_archived(
        &self,
    ) -> io::Result<impl Iterator<Item = io::Result<(Entry, String)>> + use<>> {
        let archived = archive::open_archive_reader(&self.archive_path)?
            .map(|reader| reader.lines().filter_map(parse_archived_line));
        Ok(archived.into_iter().flatten())
    }

    /// Read the whole history: archived segments first, then the active journal.
    ///
    /// Yields `(entry, line_hash)`.
    pub fn read_full(
        &self,
    ) -> io::Result<impl Iterator<Item = io::Result<(Entry, String)>> + use<>> {
        let active = self
            .read_from(0)?
            .map(|result| result.map(|(entry, _, hash)| (entry, hash)));
        Ok(self.read_archived()?.chain(active))
    }

    /// Returns the current size in bytes of the active journal.
    pub fn active_log_size(&self) -> io::Result<u64> {
        match fs::metadata(&self.log_path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Read the line immediately before the given byte offset and return its hash.
    ///
    /// The offset should point to the byte after the newline of the last consumed line.
    /// Returns `None` if offset is 0 or beyond the end of the journal.
    pub fn read_line_hash_before(&self, offset: u64) -> io::Result<Option<String>> {
        if offset == 0 {
            return Ok(None);
        }

        let mut file = File::open(&self.log_path)?;
        let file_len = file.metadata()?.len();

        if offset > file_len {
            return Ok(None);
        }

        // offset - 1 is the '\n' ending the previous line
        let newline_pos = offset - 1;
        let start = find_line_start(&mut file, newline_pos)?;

        file.seek(SeekFrom::Start(start))?;
        let mut line_buf = vec![0u8; (newline_pos - start) as usize];
        file.read_exact(&mut line_buf)?;

        Ok(Some(line_hash(&line_buf)))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }
}

const SCAN_CHUNK: u64 = 8192;

/// Position of the first byte of the line that ends at `end` (exclusive),
/// scanning backward chunk by chunk until a newline or the start of file.
fn find_line_start(file: &mut File, end: u64) -> io::Result<u64> {
    let mut buf = vec![0u8; SCAN_CHUNK as usize];
    let mut chunk_end = end;
    while chunk_end > 0 {
        let chunk_start = chunk_end.saturating_sub(SCAN_CHUNK);
        let chunk = &mut buf[..(chunk_end - chunk_start) as usize];
        file.seek(SeekFrom::Start(chunk_start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(chunk_start + pos as u64 + 1);
        }
        chunk_end = chunk_start;
    }
    Ok(0)
}

fn parse_archived_line(line: io::Result<String>) -> Option<io::Result<(Entry, String)>> {
    let line = match line {
        Ok(line) => line,
        Err(e) => return Some(Err(e)),
    };
    if line.is_empty() {
        return None;
    }
    let hash = line_hash(line.as_bytes());
    Some(
        serde_json::from_str(&line)
            .map(|entry| (entry, hash))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
    )
}

struct EntryIterator<I> {
    lines: Option<I>,
    pos: u64,
    file_len: u64,
}

impl<I: Iterator<Item = io::Result<String>>> Iterator for EntryIterator<I> {
    type Item = io::Result<(Entry, u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };

            let line_bytes = line.len() as u64;

            // Content reaching EOF without a newline is a torn write.
            if self.pos + line_bytes >= self.file_len {
                return None;
            }

            let next_pos = self.pos + line_bytes + 1;

            if line.is_empty() {
                self.pos = next_pos;
                continue;
            }

            let hash = line_hash(line.as_bytes());

            let entry: Entry = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(e) => {
                    return Some(Err(io::Error::new(io::ErrorKind::InvalidData, e)));
                }
            };

            self.pos = next_pos;
            return Some(Ok((entry, next_pos, hash)));
        }
    }
}

/// Append handle on a journal directory.
///
/// Creates the directory layout on open and, with [`LockMode::Flock`],
/// holds an exclusive lock for its whole lifetime.
pub struct Journal {
    dir: PathBuf,
    file: File,
    reader: JournalReader,
    views_dir: PathBuf,
    _lock: Option<File>,
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("dir", &self.dir)
            .field("locked", &self._lock.is_some())
            .finish()
    }
}

impl Journal {
    /// Open or create a journal with an exclusive lock.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        Self::open_with_lock(dir, LockMode::Flock)
    }

    /// Open or create a journal with the given lock mode.
    ///
    /// With [`LockMode::Flock`], fails with [`io::ErrorKind::AlreadyExists`]
    /// when another writer holds the lock.
    pub fn open_with_lock(dir: impl AsRef<Path>, lock_mode: LockMode) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let views_dir = dir.join(VIEWS_DIR);
        fs::create_dir_all(&views_dir)?;

        let lock = match lock_mode {
            LockMode::Flock => Some(acquire_lock(&dir.join(LOCK_FILE))?),
            LockMode::None => None,
        };

        let reader = JournalReader::new(&dir);
        // Only an exclusive writer may cut the tail; without the lock it could
        // be another writer's line in progress.
        let dropped = match lock_mode {
            LockMode::Flock => repair_torn_tail(reader.log_path())?,
            LockMode::None => 0,
        };
        if dropped > 0 {
            log::warn!(
                "stockfold: dropped {dropped} byte(s) of an incomplete line at the end of {}",
                reader.log_path().display()
            );
        }
        let file = open_append(reader.log_path())?;

        Ok(Journal {
            dir,
            file,
            reader,
            views_dir,
            _lock: lock,
        })
    }

    /// Append an entry to the active journal.
    ///
    /// Serializes the entry as a single JSON line, appends it and syncs the
    /// data to disk before returning.
    pub fn append(&mut self, entry: &Entry) -> io::Result<AppendResult> {
        let start_offset = self.file.seek(SeekFrom::End(0))?;
        self.write_line(entry, start_offset)
    }

    /// Append only if the journal still ends at `expected_offset` and its last
    /// line hashes to `expected_hash` (`0` and `""` for an empty journal).
    ///
    /// Nothing is written on conflict.
    pub fn append_if(
        &mut self,
        entry: &Entry,
        expected_offset: u64,
        expected_hash: &str,
    ) -> Result<AppendResult, ConditionalAppendError> {
        let actual_offset = self.file.seek(SeekFrom::End(0))?;
        if actual_offset != expected_offset {
            return Err(ConditionalAppendError::Conflict(AppendConflict {
                expected_offset,
                actual_offset,
                expected_hash: expected_hash.to_string(),
                actual_hash: None,
            }));
        }

        let actual_hash = self
            .reader
            .read_line_hash_before(actual_offset)?
            .unwrap_or_default();
        if actual_hash != expected_hash {
            return Err(ConditionalAppendError::Conflict(AppendConflict {
                expected_offset,
                actual_offset,
                expected_hash: expected_hash.to_string(),
                actual_hash: Some(actual_hash),
            }));
        }

        Ok(self.write_line(entry, actual_offset)?)
    }

    fn write_line(&mut self, entry: &Entry, start_offset: u64) -> io::Result<AppendResult> {
        let json = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut line = json.into_bytes();
        let line_hash = line_hash(&line);
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        Ok(AppendResult {
            start_offset,
            end_offset: start_offset + line.len() as u64,
            line_hash,
        })
    }

    /// Move the active journal into the compressed archive and truncate it.
    ///
    /// Callers must reset any snapshot offsets into the active journal
    /// afterwards. A no-op on an empty journal.
    pub fn rotate(&mut self) -> io::Result<()> {
        let contents = fs::read(self.reader.log_path())?;
        if contents.is_empty() {
            return Ok(());
        }
        archive::append_compressed_frame(self.reader.archive_path(), &contents)?;
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Atomically replace the whole history with `entries`.
    ///
    /// The new journal is written to a temporary file and renamed over the
    /// active one; the archive is removed afterwards. `entries` must start
    /// with a header that resets folded state, since a crash between the
    /// rename and the removal leaves the old archive in front of it.
    pub fn replace_all(&mut self, entries: &[Entry]) -> io::Result<()> {
        let tmp_path = self.reader.log_path().with_extension("jsonl.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for entry in entries {
                let json = serde_json::to_string(entry)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                writeln!(tmp, "{json}")?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, self.reader.log_path())?;
        self.file = open_append(self.reader.log_path())?;

        match fs::remove_file(self.reader.archive_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// A reader over this journal's directory.
    pub fn reader(&self) -> JournalReader {
        self.reader.clone()
    }

    /// Returns the path to the data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path to the views directory.
    pub fn views_dir(&self) -> &Path {
        &self.views_dir
    }

    /// Returns the current size in bytes of the active journal.
    pub fn active_log_size(&self) -> io::Result<u64> {
        self.reader.active_log_size()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Truncate a trailing line that has no newline (a write torn by a crash)
/// so the next append starts on a fresh line. Returns the bytes removed.
fn repair_torn_tail(path: &Path) -> io::Result<u64> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(0);
    }

    let keep = find_line_start(&mut file, len)?;
    file.set_len(keep)?;
    file.sync_all()?;
    Ok(len - keep)
}

fn acquire_lock(path: &Path) -> io::Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
            Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("another writer holds the lock on {}", path.display()),
            ))
        }
        Err(e) => Err(e),
    }
}
