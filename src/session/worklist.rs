//! The work list: an append-only file of candidate paths.
//!
//! # Overview
//!
//! [`WorkListStore::generate`] drains a path enumeration into the list, one
//! absolute path per line. [`WorkListStore::open_for_read`] re-reads it from
//! any byte offset that starts a line, and every yielded [`WorkItem`] carries
//! the byte range it occupied, which is what checkpoints are made of.
//!
//! Lines are never rewritten, so an offset recorded by one process stays
//! valid for the next one.
//!
//! # Example
//!
//! ```no_run
//! use deduplicate::session::{ExtensionFilter, WorkListStore};
//! use deduplicate::signal::CancellationToken;
//! use std::path::PathBuf;
//!
//! let store = WorkListStore::new("deduplicate-list");
//! let paths = vec![Ok(PathBuf::from("/data/a.txt")), Ok(PathBuf::from("/data/b.txt"))];
//! store
//!     .generate(paths, &ExtensionFilter::allow_all(), &CancellationToken::new())
//!     .unwrap();
//!
//! for item in store.open_for_read(0).unwrap() {
//!     let item = item.unwrap();
//!     println!("{} ends at byte {}", item.path.display(), item.end);
//! }
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::scanner::ScanError;
use crate::signal::CancellationToken;

/// Fixed name of the work list inside the state directory.
pub const WORK_LIST_FILE_NAME: &str = "deduplicate-list";

/// Capacity of the work list reader's buffer.
///
/// Kept well below the platform default so the reader never runs far ahead
/// of the lines actually handed to the scheduler.
pub const READ_BUFFER_SIZE: usize = 256;

/// Line terminator used when writing the work list.
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
/// Line terminator used when writing the work list.
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Errors raised while writing or reading the work list.
#[derive(Debug, thiserror::Error)]
pub enum WorkListError {
    /// The list could not be opened or created.
    #[error("Failed to open work list {path}: {source}")]
    Open {
        /// Work list path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Appending to the list failed.
    #[error("Failed to write work list {path}: {source}")]
    Write {
        /// Work list path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Reading the list failed part-way.
    #[error("Failed to read work list {path} at byte {offset}: {source}")]
    Read {
        /// Work list path
        path: PathBuf,
        /// Byte offset where the read started
        offset: u64,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The list could not be deleted.
    #[error("Failed to remove work list {path}: {source}")]
    Remove {
        /// Work list path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Case-sensitive extension allow-list.
///
/// An empty filter lets every path through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    /// Build a filter from extensions such as `.txt` or `txt`.
    ///
    /// A missing leading dot is added, so `txt` never matches `notes.mtxt`.
    /// Blank entries are ignored.
    #[must_use]
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .filter_map(|ext| {
                let ext = ext.as_ref().trim();
                if ext.is_empty() {
                    None
                } else if ext.starts_with('.') {
                    Some(ext.to_string())
                } else {
                    Some(format!(".{ext}"))
                }
            })
            .collect();
        Self { extensions }
    }

    /// Parse a comma-separated list like `.jpg,.png`.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// A filter that accepts every path.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether no extension is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// The normalized extensions.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether `path` ends with one of the configured extensions.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.is_empty() || self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }
}

/// Counters reported by [`WorkListStore::generate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingSummary {
    /// Paths written to the list
    pub listed: u64,
    /// Paths rejected by the extension filter
    pub filtered: u64,
    /// Paths that cannot be stored on one UTF-8 line
    pub unrepresentable: u64,
    /// Enumeration errors that were logged and skipped
    pub errors: u64,
    /// Whether cancellation stopped the listing early
    pub interrupted: bool,
}

/// One work list line together with the byte range it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// The listed path
    pub path: PathBuf,
    /// Offset of the first byte of the line
    pub start: u64,
    /// Offset just past the line terminator
    pub end: u64,
}

/// Handle to the on-disk work list.
#[derive(Debug, Clone)]
pub struct WorkListStore {
    path: PathBuf,
}

impl WorkListStore {
    /// Create a handle for the list at `path`. Nothing is touched on disk.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the list.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the list exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Current length of the list in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WorkListError::Open`] if the file cannot be inspected.
    pub fn len(&self) -> Result<u64, WorkListError> {
        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|source| self.open_error(source))
    }

    /// Whether the list holds no bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WorkListError::Open`] if the file cannot be inspected.
    pub fn is_empty(&self) -> Result<bool, WorkListError> {
        Ok(self.len()? == 0)
    }

    /// Append every enumerated path that passes `filter`.
    ///
    /// Enumeration errors are logged and skipped. Paths that are not valid
    /// UTF-8 or contain a line break are skipped with a warning. When `token`
    /// fires, listing stops and the summary is marked interrupted; what was
    /// written so far is flushed but must not be resumed from.
    ///
    /// The caller decides whether a list may be generated at all: appending
    /// to an existing list breaks any checkpoint recorded against it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkListError`] if the list cannot be created or written.
    pub fn generate<I>(
        &self,
        entries: I,
        filter: &ExtensionFilter,
        token: &CancellationToken,
    ) -> Result<ListingSummary, WorkListError>
    where
        I: IntoIterator<Item = Result<PathBuf, ScanError>>,
    {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.open_error(source))?;
        let mut writer = BufWriter::new(file);
        let mut summary = ListingSummary::default();

        for entry in entries {
            if token.is_cancelled() {
                log::debug!("Listing cancelled after {} paths", summary.listed);
                summary.interrupted = true;
                break;
            }

            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    log::warn!("Skipping during listing: {e}");
                    summary.errors += 1;
                    continue;
                }
            };

            let Some(line) = path.to_str() else {
                log::warn!("Skipping non-UTF-8 path: {}", path.display());
                summary.unrepresentable += 1;
                continue;
            };
            if line.contains(['\n', '\r']) {
                log::warn!("Skipping path containing a line break: {line:?}");
                summary.unrepresentable += 1;
                continue;
            }
            if !filter.matches(line) {
                log::trace!("Filtered out by extension: {line}");
                summary.filtered += 1;
                continue;
            }

            writer
                .write_all(line.as_bytes())
                .and_then(|()| writer.write_all(LINE_ENDING.as_bytes()))
                .map_err(|source| self.write_error(source))?;
            summary.listed += 1;
        }

        if token.is_cancelled() {
            summary.interrupted = true;
        }

        writer.flush().map_err(|source| self.write_error(source))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|source| self.write_error(source))?;

        log::debug!(
            "Listed {} paths ({} filtered, {} unrepresentable, {} errors) into {}",
            summary.listed,
            summary.filtered,
            summary.unrepresentable,
            summary.errors,
            self.path.display()
        );
        Ok(summary)
    }

    /// Open a forward-only line reader positioned at `from_offset`.
    ///
    /// `from_offset` must start a line (see [`Self::is_line_boundary`]).
    ///
    /// # Errors
    ///
    /// Returns [`WorkListError::Open`] if the list cannot be opened or seeked.
    pub fn open_for_read(&self, from_offset: u64) -> Result<LineReader, WorkListError> {
        let mut file = File::open(&self.path).map_err(|source| self.open_error(source))?;
        file.seek(SeekFrom::Start(from_offset))
            .map_err(|source| self.open_error(source))?;

        Ok(LineReader {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            path: self.path.clone(),
            offset: from_offset,
            buf: Vec::new(),
            done: false,
        })
    }

    /// Whether `offset` is a position a reader may start from: the start of
    /// the file, the end of the file, or just after a `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkListError`] if the list cannot be read.
    pub fn is_line_boundary(&self, offset: u64) -> Result<bool, WorkListError> {
        if offset == 0 {
            return Ok(true);
        }
        let len = self.len()?;
        if offset > len {
            return Ok(false);
        }
        if offset == len {
            return Ok(true);
        }

        let mut file = File::open(&self.path).map_err(|source| self.open_error(source))?;
        let mut byte = [0u8; 1];
        file.seek(SeekFrom::Start(offset - 1))
            .and_then(|_| file.read_exact(&mut byte))
            .map_err(|source| WorkListError::Read {
                path: self.path.clone(),
                offset: offset - 1,
                source,
            })?;
        Ok(byte[0] == b'\n')
    }

    /// Delete the list. A list that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`WorkListError::Remove`] if deletion fails.
    pub fn remove(&self) -> Result<(), WorkListError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkListError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn open_error(&self, source: io::Error) -> WorkListError {
        WorkListError::Open {
            path: self.path.clone(),
            source,
        }
    }

    fn write_error(&self, source: io::Error) -> WorkListError {
        WorkListError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

/// Lazy, forward-only sequence of work list lines.
///
/// Blank lines are consumed silently. A final line without terminator is
/// still yielded. Lines that are not UTF-8 are skipped with a warning.
#[derive(Debug)]
pub struct LineReader {
    reader: BufReader<File>,
    path: PathBuf,
    offset: u64,
    buf: Vec<u8>,
    done: bool,
}

impl Iterator for LineReader {
    type Item = Result<WorkItem, WorkListError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            let start = self.offset;

            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(n) => {
                    self.offset += n as u64;
                    let line = trim_line_ending(&self.buf);
                    if line.is_empty() {
                        continue;
                    }
                    match std::str::from_utf8(line) {
                        Ok(text) => {
                            return Some(Ok(WorkItem {
                                path: PathBuf::from(text),
                                start,
                                end: self.offset,
                            }))
                        }
                        Err(_) => {
                            log::warn!(
                                "Skipping non-UTF-8 line at byte {start} of {}",
                                self.path.display()
                            );
                        }
                    }
                }
                Err(source) => {
                    self.done = true;
                    return Some(Err(WorkListError::Read {
                        path: self.path.clone(),
                        offset: start,
                        source,
                    }));
                }
            }
        }
        None
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
