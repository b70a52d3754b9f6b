//! In-memory digest index.
//!
//! The first path classified with a digest becomes its original. Every later
//! path with that digest is a duplicate of the original, never of another
//! duplicate. "First" is whatever order the caller classifies in; the
//! scheduler classifies in work-list order.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::scanner::Digest;

/// Result of classifying one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// First path seen with this digest
    Original,
    /// Same digest as an earlier path
    Duplicate {
        /// The original path for the digest
        original: PathBuf,
    },
}

/// Mapping from digest to the first path observed with it.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    entries: HashMap<Digest, PathBuf>,
}

impl DedupIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `path` by `digest`, recording it if the digest is new.
    pub fn classify(&mut self, digest: Digest, path: &Path) -> Classification {
        match self.entries.entry(digest) {
            Entry::Occupied(entry) => Classification::Duplicate {
                original: entry.get().clone(),
            },
            Entry::Vacant(entry) => {
                entry.insert(path.to_path_buf());
                Classification::Original
            }
        }
    }

    /// The original recorded for `digest`, if any.
    #[must_use]
    pub fn original_for(&self, digest: &Digest) -> Option<&Path> {
        self.entries.get(digest).map(PathBuf::as_path)
    }

    /// Number of distinct digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been classified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
