mod record;

pub use record::{LogRecord, TOMB_FLAG};

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// The append-only data log.
///
/// Records are appended as CSV lines and addressed by the byte offset of
/// their first character. The log is only ever appended to; superseded and
/// deleted entries remain on disk and are ignored by the index. Handles are
/// opened per operation and released on return, so readers never hold the
/// file while the flusher appends.
#[derive(Debug)]
pub struct DataLog {
    path: PathBuf,
}

impl DataLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DataLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record and returns the byte offset where it was written.
    /// The log file is created on first append, with mode 0644.
    pub fn append(&self, record: &LogRecord) -> Result<u64> {
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o644);
        let mut file = options.open(&self.path)?;

        let line = record.encode();
        file.write_all(line.as_bytes())?;

        let size = file.metadata()?.len();
        Ok(size - line.len() as u64)
    }

    /// Reads the record starting at the given offset. Returns `Ok(None)`
    /// when the offset is at or past the end of the log, or when the log
    /// file does not exist yet.
    pub fn read(&self, offset: u64) -> Result<Option<LogRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if offset >= file.metadata()?.len() {
            return Ok(None);
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset))?;

        let mut line = String::new();
        reader.read_line(&mut line)?;
        if !line.ends_with('\n') {
            return Err(Error::Corrupt(format!(
                "truncated record at offset {offset}"
            )));
        }

        LogRecord::parse(line.trim_end_matches('\n')).map(Some)
    }

    /// Current size of the log file in bytes (zero if it does not exist).
    pub fn len(&self) -> Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Streams records starting at `from`, yielding each record with the
    /// offset it was read at. Returns `Ok(None)` when the log file does not
    /// exist yet.
    pub fn replay(&self, from: u64) -> Result<Option<Replay>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(from))?;

        Ok(Some(Replay {
            reader,
            offset: from,
        }))
    }
}

/// Iterator over `(offset, record)` pairs of a log tail.
pub struct Replay {
    reader: BufReader<File>,
    offset: u64,
}

impl Replay {
    /// The offset the next record would be read at.
    pub fn position(&self) -> u64 {
        self.offset
    }
}

impl Iterator for Replay {
    type Item = Result<(u64, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(n) => {
                let at = self.offset;
                if !line.ends_with('\n') {
                    // A partial trailing line is an interrupted append.
                    return Some(Err(Error::Corrupt(format!(
                        "truncated record at offset {at}"
                    ))));
                }
                self.offset += n as u64;
                match LogRecord::parse(line.trim_end_matches('\n')) {
                    Ok(record) => Some(Ok((at, record))),
                    Err(e) => Some(Err(e)),
                }
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}
