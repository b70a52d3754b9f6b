//! Start-up and shutdown decisions for persisted scan state.
//!
//! [`ResumeController::prepare`] inspects what a previous run left in the
//! state directory and decides whether this run resumes from a checkpoint or
//! starts fresh. [`ResumeController::shutdown`] applies the matching cleanup
//! once the scan has stopped:
//!
//! | Termination          | Work list | Checkpoint               |
//! |----------------------|-----------|--------------------------|
//! | `Completed`          | deleted   | deleted                  |
//! | `Interrupted`        | kept      | previous confirmed mark  |
//! | `Failed` (mid-scan)  | kept      | previous confirmed mark  |
//! | `Failed` (otherwise) | kept      | untouched                |
//! | `ListingInterrupted` | deleted   | untouched (none exists)  |
//!
//! Signal binding itself lives in [`crate::signal`]; the controller is told
//! how the scan ended instead of observing the process.

use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::error::SetupError;
use crate::session::{
    CheckpointError, CheckpointStore, PriorRun, SessionPaths, WorkListError, WorkListStore,
};
use crate::signal::{self, CancellationToken};

/// How to answer "resume the previous scan?".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResumeChoice {
    /// Ask interactively
    #[default]
    Ask,
    /// Always resume
    Resume,
    /// Always discard the previous state
    Restart,
}

impl ResumeChoice {
    /// Build from the `--resume` / `--restart` flags.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::ConflictingChoice`] if both are set.
    pub fn from_flags(resume: bool, restart: bool) -> Result<Self, SetupError> {
        match (resume, restart) {
            (true, true) => Err(SetupError::ConflictingChoice),
            (true, false) => Ok(Self::Resume),
            (false, true) => Ok(Self::Restart),
            (false, false) => Ok(Self::Ask),
        }
    }
}

/// Asks whether a stale work list should be resumed.
pub trait Prompt {
    /// Return `true` to resume, `false` to start over.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from reading the answer.
    fn confirm_resume(&mut self, work_list: &Path) -> io::Result<bool>;
}

/// Yes/no question on stderr, answered on stdin. Anything but `y`/`yes`
/// (including end of input) means "start over".
///
/// A termination signal while waiting for the answer ends the process at
/// once; nothing has been touched yet.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm_resume(&mut self, work_list: &Path) -> io::Result<bool> {
        let mut stderr = io::stderr().lock();
        write!(
            stderr,
            "Found unfinished scan state ({}). Resume it? [y/N] ",
            work_list.display()
        )?;
        stderr.flush()?;

        let _guard = signal::exit_on_signal();
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(parse_answer(&answer))
    }
}

fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Where the scan should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Generate a new work list and scan from offset 0
    Fresh,
    /// Reuse the work list and scan from `offset`
    Resume {
        /// Checkpointed byte offset
        offset: u64,
    },
    /// Cancelled before the decision took effect; state files are untouched
    Cancelled,
}

/// How a run ended, as reported to [`ResumeController::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every line was accounted for
    Completed,
    /// Cancelled while hashing
    Interrupted {
        /// Offset to record
        resume_offset: u64,
    },
    /// Cancelled while the work list was being generated
    ListingInterrupted,
    /// Stopped by an error; mid-scan failures carry an offset to record
    Failed {
        /// Offset to record, if the scan had started
        resume_offset: Option<u64>,
    },
}

/// Errors from cleaning up or checkpointing at shutdown.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// The checkpoint could not be written or removed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The work list could not be removed.
    #[error(transparent)]
    WorkList(#[from] WorkListError),
}

/// Owns the state files for one invocation.
#[derive(Debug, Clone)]
pub struct ResumeController {
    paths: SessionPaths,
    choice: ResumeChoice,
    work_list: WorkListStore,
    checkpoint: CheckpointStore,
    cancel: CancellationToken,
}

impl ResumeController {
    /// Create a controller for `paths`.
    #[must_use]
    pub fn new(paths: SessionPaths, choice: ResumeChoice) -> Self {
        Self {
            work_list: WorkListStore::new(&paths.work_list),
            checkpoint: CheckpointStore::new(&paths.checkpoint),
            paths,
            choice,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `token` while deciding how to start.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The work list handle.
    #[must_use]
    pub fn work_list(&self) -> &WorkListStore {
        &self.work_list
    }

    /// The checkpoint handle.
    #[must_use]
    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    /// Decide how this run starts. `prompt` is consulted only when the
    /// choice is [`ResumeChoice::Ask`] and a work list exists.
    ///
    /// Restarting deletes both state files. A checkpoint without its work
    /// list is fatal unless the choice is [`ResumeChoice::Restart`]. If the
    /// token is cancelled by the time the choice is known, nothing is
    /// deleted and [`StartMode::Cancelled`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] when the persisted state is inconsistent or
    /// cannot be read.
    pub fn prepare(&self, prompt: &mut dyn Prompt) -> Result<StartMode, SetupError> {
        let prior = self.paths.prior_run();
        log::debug!("Prior run state: {prior:?}");

        match prior {
            PriorRun::None => Ok(StartMode::Fresh),
            PriorRun::CheckpointWithoutList => {
                if self.cancel.is_cancelled() {
                    return Ok(StartMode::Cancelled);
                }
                if self.choice == ResumeChoice::Restart {
                    log::info!("Removing orphan checkpoint {}", self.checkpoint.path().display());
                    self.checkpoint.remove()?;
                    Ok(StartMode::Fresh)
                } else {
                    Err(SetupError::OrphanCheckpoint(self.checkpoint.path().to_path_buf()))
                }
            }
            PriorRun::Interrupted | PriorRun::ListWithoutCheckpoint => {
                let resume = match self.choice {
                    ResumeChoice::Resume => true,
                    ResumeChoice::Restart => false,
                    ResumeChoice::Ask => prompt
                        .confirm_resume(self.work_list.path())
                        .map_err(SetupError::Prompt)?,
                };
                if self.cancel.is_cancelled() {
                    log::info!("Cancelled before start; keeping previous scan state");
                    return Ok(StartMode::Cancelled);
                }

                if !resume {
                    log::info!("Discarding previous scan state");
                    self.work_list.remove()?;
                    self.checkpoint.remove()?;
                    return Ok(StartMode::Fresh);
                }
                if prior == PriorRun::ListWithoutCheckpoint {
                    return Err(SetupError::MissingCheckpoint(
                        self.checkpoint.path().to_path_buf(),
                    ));
                }

                let offset = self.checkpoint.load()?;
                let len = self.work_list.len()?;
                if offset > len || !self.work_list.is_line_boundary(offset)? {
                    return Err(SetupError::InvalidCheckpoint { offset, len });
                }
                log::info!("Resuming from byte {offset} of {len}");
                Ok(StartMode::Resume { offset })
            }
        }
    }

    /// Apply the cleanup or checkpoint for `termination`.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] if a state file cannot be written or removed.
    pub fn shutdown(&self, termination: Termination) -> Result<(), ShutdownError> {
        log::debug!("Shutting down after {termination:?}");
        match termination {
            Termination::Completed => {
                self.work_list.remove()?;
                self.checkpoint.remove()?;
            }
            Termination::Interrupted { resume_offset }
            | Termination::Failed {
                resume_offset: Some(resume_offset),
            } => {
                self.checkpoint.save(resume_offset)?;
                log::info!(
                    "Checkpoint saved at byte {resume_offset} ({})",
                    self.checkpoint.path().display()
                );
            }
            Termination::ListingInterrupted => {
                self.work_list.remove()?;
            }
            Termination::Failed {
                resume_offset: None,
            } => {}
        }
        Ok(())
    }
}
