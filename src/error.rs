//! Structured error handling, setup errors, and exit codes.

use std::path::PathBuf;

use serde::Serialize;

use crate::session::{CheckpointError, WorkListError};

/// Exit codes for the deduplicate application.
///
/// - 0: Success (scan completed, state files cleaned up)
/// - 1: General error (unexpected failure, including fail-fast hash errors)
/// - 2: Setup error (work list / lock file inconsistency, bad scan root)
/// - 130: Interrupted (checkpoint written, resumable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Scan completed normally.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Persisted state or arguments were inconsistent; nothing was scanned.
    SetupError = 2,
    /// Interrupted by a termination signal.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DD000",
            Self::GeneralError => "DD001",
            Self::SetupError => "DD002",
            Self::Interrupted => "DD130",
        }
    }
}

/// Fatal inconsistencies detected before scanning starts.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The scan root does not exist.
    #[error("Scan root not found: {0}")]
    RootNotFound(PathBuf),

    /// The scan root is not a directory.
    #[error("Scan root is not a directory: {0}")]
    RootNotADirectory(PathBuf),

    /// A lock file exists but the work list it points into is gone.
    #[error(
        "Found checkpoint {0} without a work list; remove it or rerun with --restart"
    )]
    OrphanCheckpoint(PathBuf),

    /// Resume was requested but no checkpoint was recorded for the work list.
    #[error("Cannot resume: work list exists but checkpoint {0} is missing; rerun with --restart")]
    MissingCheckpoint(PathBuf),

    /// The recorded offset does not address a line start inside the work list.
    #[error("Checkpoint offset {offset} is not a line boundary of a {len}-byte work list")]
    InvalidCheckpoint {
        /// Offset read from the lock file
        offset: u64,
        /// Current work list length in bytes
        len: u64,
    },

    /// Both `--resume` and `--restart` were given.
    #[error("--resume and --restart cannot be used together")]
    ConflictingChoice,

    /// Reading or writing the checkpoint failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Inspecting or removing the work list failed.
    #[error(transparent)]
    WorkList(#[from] WorkListError),

    /// The interactive resume prompt could not be answered.
    #[error("Failed to read answer from terminal: {0}")]
    Prompt(#[source] std::io::Error),
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DD002")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including the cause chain
    pub message: String,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
        }
    }
}

/// Pick the exit code for an error that escaped `run_app`.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if err.chain().any(|cause| cause.is::<SetupError>()) {
        ExitCode::SetupError
    } else {
        ExitCode::GeneralError
    }
}
