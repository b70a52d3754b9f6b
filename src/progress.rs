//! Progress reporting utilities using indicatif.
//!
//! [`Progress`] implements [`ProgressCallback`] with a spinner while the work
//! list is generated and a byte-based bar while it is hashed. The hashing bar
//! tracks the work list offset, so a resumed scan starts part-way along.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::scanner::path_utils::shorten_path;

/// Phase name used while enumerating files into the work list.
pub const PHASE_LISTING: &str = "listing";
/// Phase name used while hashing the work list.
pub const PHASE_HASHING: &str = "hashing";

/// Progress callback for the listing and hashing phases.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - [`PHASE_LISTING`] or [`PHASE_HASHING`]
    /// * `total` - Total units (0 when unknown, bytes of work list when hashing)
    /// * `position` - Units already done (the resume offset when hashing)
    fn on_phase_start(&self, phase: &str, total: u64, position: u64);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `position` - Files listed so far, or the confirmed work list offset
    /// * `path` - Path being processed
    fn on_progress(&self, position: u64, path: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    listing: Mutex<Option<ProgressBar>>,
    hashing: Mutex<Option<ProgressBar>>,
    hidden: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `hidden` - If true, nothing is drawn.
    ///
    /// # Examples
    ///
    /// ```
    /// use deduplicate::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(hidden: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            listing: Mutex::new(None),
            hashing: Mutex::new(None),
            hidden,
        }
    }

    fn listing_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn hashing_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: u64, position: u64) {
        if self.hidden {
            return;
        }

        match phase {
            PHASE_LISTING => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::listing_style());
                pb.set_message("Listing files");
                pb.enable_steady_tick(Duration::from_millis(100));
                *self.listing.lock().unwrap() = Some(pb);
            }
            PHASE_HASHING => {
                let pb = self.multi.add(ProgressBar::new(total));
                pb.set_style(Self::hashing_style());
                pb.set_position(position);
                pb.set_message("Hashing");
                *self.hashing.lock().unwrap() = Some(pb);
            }
            _ => log::trace!("No progress bar for phase {phase}"),
        }
    }

    fn on_progress(&self, position: u64, path: &str) {
        if self.hidden {
            return;
        }

        let message = shorten_path(path, 30);
        if let Some(ref pb) = *self.hashing.lock().unwrap() {
            pb.set_position(position);
            pb.set_message(message);
        } else if let Some(ref pb) = *self.listing.lock().unwrap() {
            pb.set_position(position);
            pb.set_message(message);
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.hidden {
            return;
        }

        let (slot, done) = match phase {
            PHASE_LISTING => (&self.listing, "Listing complete"),
            PHASE_HASHING => (&self.hashing, "Hashing complete"),
            _ => return,
        };
        if let Some(pb) = slot.lock().unwrap().take() {
            pb.finish_with_message(done);
        }
    }
}
