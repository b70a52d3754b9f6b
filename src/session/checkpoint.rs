//! The checkpoint ("lock") file holding a resume offset.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Fixed name of the checkpoint file inside the state directory.
pub const CHECKPOINT_FILE_NAME: &str = "deduplicate.lock";

/// Errors raised while loading or saving a checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Reading, writing, or removing the file failed.
    #[error("Checkpoint I/O error for {path}: {source}")]
    Io {
        /// Checkpoint path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The file does not contain a non-negative decimal integer.
    #[error("Malformed checkpoint {path}: {content:?} is not a byte offset")]
    Malformed {
        /// Checkpoint path
        path: PathBuf,
        /// The offending content (trimmed)
        content: String,
    },
}

/// Handle to the on-disk checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a handle for the checkpoint at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the checkpoint.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a checkpoint exists, i.e. a previous run was interrupted.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the recorded offset.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] if the file cannot be read and
    /// [`CheckpointError::Malformed`] if it holds anything but a decimal integer.
    pub fn load(&self) -> Result<u64, CheckpointError> {
        let content = fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        let trimmed = content.trim();
        trimmed.parse().map_err(|_| CheckpointError::Malformed {
            path: self.path.clone(),
            content: trimmed.to_string(),
        })
    }

    /// Record `offset`, replacing any previous checkpoint.
    ///
    /// The value goes to a sibling temporary file first and is renamed into
    /// place, so readers see either the old offset or the new one.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] on any write or rename failure.
    pub fn save(&self, offset: u64) -> Result<(), CheckpointError> {
        let tmp = self.tmp_path();
        let write = || -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(offset.to_string().as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };

        write().map_err(|source| {
            let _ = fs::remove_file(&tmp);
            self.io_error(source)
        })?;

        log::debug!("Checkpoint {} saved at byte {offset}", self.path.display());
        Ok(())
    }

    /// Delete the checkpoint. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] if deletion fails.
    pub fn remove(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| CHECKPOINT_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
