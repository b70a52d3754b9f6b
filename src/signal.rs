//! Termination handling and scan cancellation.
//!
//! A [`CancellationToken`] is an `Arc<AtomicBool>` shared between the signal
//! handler and every long-running component (path lister, hash scheduler).
//! Components observe it at each suspension point; nothing is forcibly killed.
//!
//! # Usage
//!
//! ```rust,no_run
//! use deduplicate::signal::install_handler;
//!
//! let token = install_handler().expect("Failed to install signal handler");
//!
//! // Pass clones of the token into the lister and the scheduler.
//! if token.is_cancelled() {
//!     println!("Interrupted, writing checkpoint...");
//! }
//! ```
//!
//! # Exit Codes
//!
//! On interruption the application persists its checkpoint and exits with
//! code 130 (128 + SIGINT), the conventional status for an interrupted process.
//!
//! A second signal, or any signal while [`exit_on_signal`] is held (no scan
//! state in flight, e.g. the resume prompt), exits with 130 straight away.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption.
///
/// Also used for SIGTERM and SIGHUP: the `ctrlc` handler is not told which
/// signal arrived, so 143 and 129 cannot be reported.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

static EXIT_IMMEDIATELY: AtomicBool = AtomicBool::new(false);

/// While alive, a termination signal exits the process instead of only
/// cancelling the token. Dropping it restores the normal behaviour.
#[derive(Debug)]
#[must_use = "the section ends when the guard is dropped"]
pub struct ExitOnSignalGuard {
    previous: bool,
}

impl Drop for ExitOnSignalGuard {
    fn drop(&mut self) {
        EXIT_IMMEDIATELY.store(self.previous, Ordering::SeqCst);
    }
}

/// Mark a section with nothing to checkpoint, such as waiting on stdin.
pub fn exit_on_signal() -> ExitOnSignalGuard {
    ExitOnSignalGuard {
        previous: EXIT_IMMEDIATELY.swap(true, Ordering::SeqCst),
    }
}

/// Whether a signal arriving now should exit the process outright.
#[must_use]
pub fn exits_immediately(token: &CancellationToken) -> bool {
    EXIT_IMMEDIATELY.load(Ordering::SeqCst) || token.is_cancelled()
}

/// Shared cancellation flag observed by the lister and the scheduler.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear the flag so a handler can be reused within one process (tests).
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the termination handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

/// Bind the process termination signals to a cancellation token.
///
/// The OS handler is registered at most once per process; later calls return
/// the same token after resetting it. When the handler is already owned by
/// someone else (parallel tests), an unhooked token is returned instead so
/// that manual [`CancellationToken::cancel`] keeps working.
///
/// The handler only flips the flag. Checkpointing and the final exit happen
/// on the main thread once the scheduler has wound down.
///
/// # Errors
///
/// Kept for API stability; installation conflicts fall back to an unhooked
/// token rather than failing.
pub fn install_handler() -> Result<CancellationToken, SignalError> {
    if let Some(token) = GLOBAL_TOKEN.get() {
        token.reset();
        return Ok(token.clone());
    }

    let token = CancellationToken::new();
    let hooked = token.clone();

    match ctrlc::set_handler(move || {
        if exits_immediately(&hooked) {
            hooked.cancel();
            let _ = writeln!(std::io::stderr(), "\nInterrupted.");
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
        hooked.cancel();

        let _ = writeln!(std::io::stderr(), "\nInterrupted. Saving checkpoint...");
        let _ = std::io::stderr().flush();

        log::info!("Termination signal received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_TOKEN.set(token.clone());
            Ok(token)
        }
        Err(e) => {
            if let Some(existing) = GLOBAL_TOKEN.get() {
                existing.reset();
                return Ok(existing.clone());
            }
            log::debug!("Termination handler already registered ({e}), using unhooked token");
            let fallback = CancellationToken::new();
            let _ = GLOBAL_TOKEN.set(fallback.clone());
            Ok(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();

        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_reset() {
        let token = CancellationToken::new();
        token.cancel();
        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_install_handler_twice_returns_live_token() {
        let first = install_handler().unwrap();
        let second = install_handler().unwrap();

        second.cancel();
        assert!(first.is_cancelled());
        second.reset();
    }

    #[test]
    fn test_exit_on_signal_guard_scopes_escalation() {
        let token = CancellationToken::new();
        assert!(!exits_immediately(&token));
        {
            let _outer = exit_on_signal();
            assert!(exits_immediately(&token));
            {
                let _inner = exit_on_signal();
            }
            assert!(exits_immediately(&token));
        }
        assert!(!exits_immediately(&token));
    }

    #[test]
    fn test_second_signal_escalates() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(exits_immediately(&token));
    }

    #[test]
    fn test_exit_code_interrupted() {
        assert_eq!(EXIT_CODE_INTERRUPTED, 130);
    }

    #[test]
    fn test_token_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CancellationToken>();
    }
}
