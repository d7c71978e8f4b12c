//! Compressed storage for rotated journal segments.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// zstd level used for archived segments.
const COMPRESSION_LEVEL: i32 = 3;

/// Compress a journal segment and append it as a new zstd frame.
/// Creates the archive file if it doesn't exist.
pub(crate) fn append_compressed_frame(archive_path: &Path, data: &[u8]) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(archive_path)?;
    let mut encoder = zstd::Encoder::new(file, COMPRESSION_LEVEL)?;
    encoder.write_all(data)?;
    let file = encoder.finish()?;
    file.sync_data()?;
    Ok(())
}

/// Open the archive as one continuous line stream across all frames.
/// Returns `Ok(None)` if nothing has been archived yet.
pub(crate) fn open_archive_reader(archive_path: &Path) -> io::Result<Option<Box<dyn BufRead>>> {
    let file = match File::open(archive_path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let decoder = zstd::Decoder::new(file)?;
    Ok(Some(Box::new(BufReader::new(decoder))))
}
