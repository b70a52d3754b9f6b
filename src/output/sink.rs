//! Result sinks: append-only line loggers.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::session::LINE_ENDING;

/// `--result` value that prints records to stdout instead of a file.
pub const STDOUT_TARGET: &str = "-";

/// Whether `target` names stdout rather than a file.
#[must_use]
pub fn is_stdout_target(target: &Path) -> bool {
    target == Path::new(STDOUT_TARGET)
}

/// Sink for a `--result` target: [`ConsoleSink`] for [`STDOUT_TARGET`],
/// otherwise a [`FileSink`] appending to `target`.
#[must_use]
pub fn sink_for(target: &Path) -> Box<dyn ResultSink> {
    if is_stdout_target(target) {
        Box::new(ConsoleSink)
    } else {
        Box::new(FileSink::new(target))
    }
}

/// Receives result lines. Must be opened before the first `log` and closed
/// once afterwards; [`OpenSink`] enforces that pairing.
pub trait ResultSink {
    /// Acquire the underlying resource.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from acquiring the resource.
    fn open(&mut self) -> io::Result<()>;

    /// Append one line. The terminator is added by the sink.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from writing, or an error if the sink is closed.
    fn log(&mut self, line: &str) -> io::Result<()>;

    /// Flush and release the resource.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from flushing.
    fn close(&mut self) -> io::Result<()>;
}

/// Appends result lines to a file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create a sink for `path`. The file is created on [`ResultSink::open`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    /// Timestamped default name, `dedup-results-<unix millis>.txt`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from(format!("dedup-results-{}.txt", Utc::now().timestamp_millis()))
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for FileSink {
    fn open(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        log::debug!("Result file {} opened", self.path.display());
        Ok(())
    }

    fn log(&mut self, line: &str) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("result file used before open"))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(LINE_ENDING.as_bytes())
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

/// Prints result lines to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ResultSink for ConsoleSink {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn log(&mut self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(line.as_bytes())?;
        out.write_all(LINE_ENDING.as_bytes())
    }

    fn close(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// An opened sink that is closed exactly once: by [`OpenSink::close`] or,
/// on every other exit path, when dropped.
pub struct OpenSink<'a> {
    sink: &'a mut dyn ResultSink,
    closed: bool,
}

impl<'a> OpenSink<'a> {
    /// Open `sink` and guard it.
    ///
    /// # Errors
    ///
    /// Returns the error from [`ResultSink::open`]; the sink is not closed then.
    pub fn open(sink: &'a mut dyn ResultSink) -> io::Result<Self> {
        sink.open()?;
        Ok(Self {
            sink,
            closed: false,
        })
    }

    /// Append one line.
    ///
    /// # Errors
    ///
    /// Returns the error from [`ResultSink::log`].
    pub fn log(&mut self, line: &str) -> io::Result<()> {
        self.sink.log(line)
    }

    /// Close the sink and report the outcome.
    ///
    /// # Errors
    ///
    /// Returns the error from [`ResultSink::close`].
    pub fn close(mut self) -> io::Result<()> {
        self.closed = true;
        self.sink.close()
    }
}

impl Drop for OpenSink<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.sink.close() {
                log::warn!("Failed to close result sink: {e}");
            }
        }
    }
}
