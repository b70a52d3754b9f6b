//! Persisted scan state: the work list and the checkpoint ("lock") file.
//!
//! A scan keeps two files in its state directory:
//!
//! * `deduplicate-list`: every candidate path, one per line, append-only.
//!   Byte offsets into this file identify resume positions.
//! * `deduplicate.lock`: a single decimal byte offset into the work list.
//!   It is written only when a scan stops abnormally, so its presence means
//!   "a previous run was interrupted".
//!
//! # Architecture
//!
//! * [`worklist`]: generation and offset-addressed reading of the work list.
//! * [`checkpoint`]: loading, atomically saving, and removing the offset.

pub mod checkpoint;
pub mod worklist;

use std::path::{Path, PathBuf};

pub use checkpoint::{CheckpointError, CheckpointStore, CHECKPOINT_FILE_NAME};
pub use worklist::{
    ExtensionFilter, LineReader, ListingSummary, WorkItem, WorkListError, WorkListStore,
    LINE_ENDING, READ_BUFFER_SIZE, WORK_LIST_FILE_NAME,
};

/// Locations of the two state files for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    /// Path of the newline-delimited work list.
    pub work_list: PathBuf,
    /// Path of the checkpoint offset file.
    pub checkpoint: PathBuf,
}

impl SessionPaths {
    /// State files with their fixed names inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            work_list: dir.join(WORK_LIST_FILE_NAME),
            checkpoint: dir.join(CHECKPOINT_FILE_NAME),
        }
    }

    /// Classify what a previous run left behind.
    #[must_use]
    pub fn prior_run(&self) -> PriorRun {
        match (self.work_list.exists(), self.checkpoint.exists()) {
            (false, false) => PriorRun::None,
            (true, true) => PriorRun::Interrupted,
            (true, false) => PriorRun::ListWithoutCheckpoint,
            (false, true) => PriorRun::CheckpointWithoutList,
        }
    }
}

impl Default for SessionPaths {
    fn default() -> Self {
        Self::in_dir(Path::new("."))
    }
}

/// State left on disk by an earlier invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorRun {
    /// Neither file exists: start from scratch.
    None,
    /// Work list and checkpoint both exist: resumable.
    Interrupted,
    /// A work list without a checkpoint: the previous process died without
    /// recording progress.
    ListWithoutCheckpoint,
    /// A checkpoint without its work list. Always fatal.
    CheckpointWithoutList,
}
