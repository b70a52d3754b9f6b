//! Directory enumeration using walkdir.
//!
//! # Overview
//!
//! [`PathLister`] produces the absolute path of every regular file below a
//! root, depth-first. Directories are never yielded. Siblings are visited in
//! file-name order so that repeated listings of an unchanged tree agree.
//!
//! Unreadable entries are yielded as [`ScanError`] values rather than
//! stopping the walk; the work list generator logs and skips them.
//!
//! # Example
//!
//! ```no_run
//! use deduplicate::scanner::{PathLister, WalkerConfig};
//! use std::path::Path;
//!
//! let lister = PathLister::new(Path::new("/home/user/Downloads"), WalkerConfig::default())
//!     .unwrap();
//! let files: Vec<_> = lister.enumerate().filter_map(Result::ok).collect();
//! println!("Found {} files", files.len());
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use super::{ScanError, WalkerConfig};
use crate::progress::{ProgressCallback, PHASE_LISTING};
use crate::signal::CancellationToken;

/// Depth-first lister of regular files.
pub struct PathLister {
    /// Canonical root path
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional token for early termination
    token: Option<CancellationToken>,
    /// Optional progress reporting
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for PathLister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathLister")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("token", &self.token)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl PathLister {
    /// Create a lister rooted at `root`.
    ///
    /// The root is canonicalized so that every yielded path is absolute.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotFound`] if `root` does not exist and
    /// [`ScanError::NotADirectory`] if it is not a directory.
    pub fn new(root: &Path, config: WalkerConfig) -> Result<Self, ScanError> {
        let root = root
            .canonicalize()
            .map_err(|e| ScanError::from_io(root, e))?;
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root));
        }

        Ok(Self {
            root,
            config,
            token: None,
            progress: None,
        })
    }

    /// Stop enumeration once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Report each listed file to `callback`.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// The canonical root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Walk the tree, yielding file paths.
    ///
    /// Restartable only from scratch: each call walks the whole tree again.
    pub fn enumerate(&self) -> impl Iterator<Item = Result<PathBuf, ScanError>> + '_ {
        let walk = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();

        if let Some(ref progress) = self.progress {
            progress.on_phase_start(PHASE_LISTING, 0, 0);
        }
        let mut listed = 0u64;

        walk.into_iter()
            .take_while(move |_| {
                let stop = self.is_cancelled();
                if stop {
                    log::debug!("Lister: cancellation requested, stopping walk");
                }
                !stop
            })
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => return Some(Err(self.walk_error(e))),
                };

                let file_type = entry.file_type();
                if file_type.is_dir() {
                    return None;
                }
                if file_type.is_symlink() {
                    log::trace!("Skipping symlink: {}", entry.path().display());
                    return None;
                }
                if !file_type.is_file() {
                    log::trace!("Skipping special file: {}", entry.path().display());
                    return None;
                }

                listed += 1;
                if let Some(ref progress) = self.progress {
                    progress.on_progress(listed, &entry.path().to_string_lossy());
                }
                Some(Ok(entry.into_path()))
            })
    }

    fn walk_error(&self, err: walkdir::Error) -> ScanError {
        let path = err
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        if let Some(ancestor) = err.loop_ancestor() {
            log::debug!(
                "Symlink loop at {} back to {}",
                path.display(),
                ancestor.display()
            );
        }
        match err.into_io_error() {
            Some(io) => ScanError::from_io(&path, io),
            None => ScanError::Io {
                path,
                source: std::io::Error::other("filesystem loop detected"),
            },
        }
    }
}
