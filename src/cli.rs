//! Command-line interface definitions for deduplicate.
//!
//! This module defines all CLI arguments using the clap derive API. Flags that
//! also exist as configuration keys are optional here so that an absent flag
//! leaves the configured value alone.
//!
//! # Example
//!
//! ```bash
//! # Scan the current directory, results to dedup-results-<millis>.txt
//! deduplicate
//!
//! # Only text and markdown files, with per-file hashes logged
//! deduplicate --dir ~/Documents --types .txt,.md -v
//!
//! # Continue an interrupted scan without being asked
//! deduplicate --dir ~/Documents --resume
//! ```

use std::path::PathBuf;

use clap::Parser;

use crate::output::RecordFormat;
use crate::scanner::HashAlgorithm;

/// Resumable duplicate file finder.
///
/// Lists every file below a directory, hashes them with bounded concurrency
/// and writes one line per duplicate. An interrupted scan leaves a
/// checkpoint behind and can be resumed later.
#[derive(Debug, Parser)]
#[command(name = "deduplicate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to scan (same as --dir)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Directory to scan recursively [default: current directory]
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// File receiving the duplicate records, or `-` for stdout [default: dedup-results-<millis>.txt]
    #[arg(long, value_name = "FILE")]
    pub result: Option<PathBuf>,

    /// Comma-separated extension allow-list, e.g. ".jpg,.png"
    #[arg(long, value_name = "EXTS")]
    pub types: Option<String>,

    /// Increase verbosity level (-v logs each hash, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR")]
    pub no_color: bool,

    /// Maximum number of files hashed at once [default: 10]
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: Option<u32>,

    /// Duplicate record format [default: pair]
    #[arg(long, value_enum)]
    pub format: Option<RecordFormat>,

    /// Content hash algorithm [default: blake3]
    #[arg(long, value_enum)]
    pub algorithm: Option<HashAlgorithm>,

    /// Log and skip files that cannot be hashed instead of stopping
    #[arg(long)]
    pub keep_going: bool,

    /// Follow symbolic links while listing
    ///
    /// Warning: symlink cycles are detected and skipped, but linked trees
    /// may be listed more than once.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Directory holding the work list and checkpoint [default: current directory]
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Configuration file [default: platform config dir]/config.toml
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Resume an unfinished scan without asking
    #[arg(long, conflicts_with = "restart")]
    pub resume: bool,

    /// Discard any unfinished scan without asking
    #[arg(long)]
    pub restart: bool,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Report fatal errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,
}

impl Cli {
    /// The scan root: `--dir`, else the positional path, else `.`.
    #[must_use]
    pub fn scan_root(&self) -> PathBuf {
        self.dir
            .clone()
            .or_else(|| self.path.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
