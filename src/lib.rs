//! deduplicate - resumable duplicate file finder
//!
//! Lists every file below a directory into a persisted work list, hashes the
//! list with bounded concurrency and reports each file whose content matches
//! an earlier one. An interrupted scan records a byte offset into the work
//! list so the next run can continue where it stopped.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod resume;
pub mod scanner;
pub mod session;
pub mod signal;

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use yansi::Paint;

use crate::cli::Cli;
use crate::config::Config;
use crate::duplicates::{HashScheduler, ScanStats, SchedulerConfig, SchedulerError};
use crate::error::{ExitCode, SetupError};
use crate::output::{is_stdout_target, sink_for, FileSink, OpenSink};
use crate::progress::{Progress, ProgressCallback, PHASE_LISTING};
use crate::resume::{ResumeChoice, ResumeController, StartMode, StdinPrompt, Termination};
use crate::scanner::{PathLister, ScanError, WalkerConfig};
use crate::signal::CancellationToken;

/// Run one scan as described by `cli`.
///
/// Returns the exit code for runs that ended as planned, including
/// interruption. Errors carry their own exit code via
/// [`error::exit_code_for`].
///
/// # Errors
///
/// Returns an error if configuration, persisted state, listing, hashing or
/// writing results fails.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color || !std::io::stdout().is_terminal() {
        yansi::disable();
    }

    let config = Config::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .apply_cli(&cli);
    config.validate()?;
    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::Success);
    }

    let token = signal::install_handler().context("Failed to install signal handler")?;
    let choice = ResumeChoice::from_flags(cli.resume, cli.restart)?;
    let controller =
        ResumeController::new(config.session_paths(), choice).with_cancellation(token.clone());
    let progress = Arc::new(Progress::new(!config.progress));

    let start_offset = match controller.prepare(&mut StdinPrompt)? {
        StartMode::Resume { offset } => offset,
        StartMode::Cancelled => {
            eprintln!("Interrupted before the scan started; previous state kept.");
            return Ok(ExitCode::Interrupted);
        }
        StartMode::Fresh => {
            let root = cli.scan_root();
            log::info!("Processing directory: {}", root.display());
            if !list_files(&root, &config, &controller, &token, &progress)? {
                eprintln!("Interrupted while listing files; the next run starts over.");
                return Ok(ExitCode::Interrupted);
            }
            0
        }
    };

    let result_path = cli.result.clone().unwrap_or_else(FileSink::default_path);
    let outcome = {
        let mut target = sink_for(&result_path);
        let mut sink = match OpenSink::open(target.as_mut()) {
            Ok(sink) => sink,
            Err(e) => {
                controller.shutdown(Termination::Failed {
                    resume_offset: Some(start_offset),
                })?;
                return Err(e).with_context(|| {
                    format!("Failed to open result file {}", result_path.display())
                });
            }
        };

        let scheduler = HashScheduler::new(
            config.algorithm.hasher(),
            SchedulerConfig::default()
                .with_concurrency(config.concurrency)
                .with_failure_policy(config.failure_policy())
                .with_record_format(config.format)
                .with_progress_callback(Arc::clone(&progress) as Arc<dyn ProgressCallback>),
        )
        .with_cancellation(token.clone());

        let outcome = scheduler.run(controller.work_list(), start_offset, &mut sink);
        let closed = sink.close();
        match (outcome, closed) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => {
                controller.shutdown(Termination::Failed {
                    resume_offset: Some(start_offset),
                })?;
                return Err(e).with_context(|| {
                    format!("Failed to finish result file {}", result_path.display())
                });
            }
            (Err(e), _) => Err(e),
        }
    };

    match outcome {
        Ok(outcome) if outcome.is_completed() => {
            controller.shutdown(Termination::Completed)?;
            if !cli.quiet {
                print_summary(&outcome.stats, &result_path);
            }
            Ok(ExitCode::Success)
        }
        Ok(outcome) => {
            let resume_offset = outcome.marks.resume_offset();
            controller.shutdown(Termination::Interrupted { resume_offset })?;
            eprintln!(
                "Interrupted. Progress saved at byte {resume_offset}; run again with --resume to continue."
            );
            Ok(ExitCode::Interrupted)
        }
        Err(e) => {
            let resume_offset = match e {
                SchedulerError::WorkList(_) => None,
                ref other => Some(other.resume_offset().unwrap_or(start_offset)),
            };
            controller.shutdown(Termination::Failed { resume_offset })?;
            Err(e).context("Scan failed")
        }
    }
}

/// Generate the work list for `root`. Returns `false` if listing was
/// interrupted, in which case the partial list has been removed.
fn list_files(
    root: &Path,
    config: &Config,
    controller: &ResumeController,
    token: &CancellationToken,
    progress: &Arc<Progress>,
) -> Result<bool> {
    let lister = PathLister::new(root, WalkerConfig::new(config.follow_symlinks))
        .map_err(root_error)?
        .with_cancellation(token.clone())
        .with_progress_callback(Arc::clone(progress) as Arc<dyn ProgressCallback>);

    let listed = controller
        .work_list()
        .generate(lister.enumerate(), &config.extension_filter(), token);
    progress.on_phase_end(PHASE_LISTING);

    let summary = match listed {
        Ok(summary) => summary,
        Err(e) => {
            controller.shutdown(Termination::ListingInterrupted)?;
            return Err(e).context("Failed to write work list");
        }
    };
    if summary.interrupted {
        controller.shutdown(Termination::ListingInterrupted)?;
        return Ok(false);
    }

    log::info!(
        "Listed {} files ({} filtered out, {} skipped)",
        summary.listed,
        summary.filtered,
        summary.unrepresentable + summary.errors
    );
    Ok(true)
}

fn root_error(err: ScanError) -> anyhow::Error {
    match err {
        ScanError::NotFound(path) => SetupError::RootNotFound(path).into(),
        ScanError::NotADirectory(path) => SetupError::RootNotADirectory(path).into(),
        other => anyhow::Error::new(other).context("Cannot scan directory"),
    }
}

fn print_summary(stats: &ScanStats, result_path: &Path) {
    println!(
        "{} {} files hashed ({})",
        "Done:".green().bold(),
        stats.classified,
        ByteSize::b(stats.bytes_hashed)
    );
    println!(
        "{} duplicates, {} reclaimable",
        stats.duplicates.bold(),
        ByteSize::b(stats.reclaimable_bytes).to_string().bold()
    );
    if stats.skipped_missing > 0 || stats.failed > 0 {
        println!(
            "{}",
            format!(
                "{} vanished, {} unreadable",
                stats.skipped_missing, stats.failed
            )
            .yellow()
        );
    }
    if stats.duplicates > 0 && !is_stdout_target(result_path) {
        println!("Results written to {}", result_path.display());
    }
}
