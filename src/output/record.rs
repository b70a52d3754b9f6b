//! Duplicate records and their line formats.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scanner::{digest_to_hex, Digest};

/// How a [`DuplicateRecord`] is rendered as one output line.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// `<duplicate> => <original>`
    #[default]
    Pair,
    /// The duplicate path alone
    Path,
    /// One JSON object per line
    Json,
}

impl std::fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordFormat::Pair => write!(f, "pair"),
            RecordFormat::Path => write!(f, "path"),
            RecordFormat::Json => write!(f, "json"),
        }
    }
}

/// A detected duplicate, paired with the first path seen with its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRecord {
    /// First-dispatched path with this digest
    pub original: PathBuf,
    /// The later path with identical content
    pub duplicate: PathBuf,
    /// Shared content digest
    pub digest: Digest,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    original: &'a str,
    duplicate: &'a str,
    digest: String,
}

impl DuplicateRecord {
    /// Create a record.
    #[must_use]
    pub fn new(original: PathBuf, duplicate: PathBuf, digest: Digest) -> Self {
        Self {
            original,
            duplicate,
            digest,
        }
    }

    /// Render the record as a single line without terminator.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for [`RecordFormat::Json`] only.
    pub fn render(&self, format: RecordFormat) -> Result<String, serde_json::Error> {
        match format {
            RecordFormat::Pair => Ok(format!(
                "{} => {}",
                self.duplicate.display(),
                self.original.display()
            )),
            RecordFormat::Path => Ok(self.duplicate.display().to_string()),
            RecordFormat::Json => {
                let original = self.original.to_string_lossy();
                let duplicate = self.duplicate.to_string_lossy();
                serde_json::to_string(&JsonRecord {
                    original: &original,
                    duplicate: &duplicate,
                    digest: digest_to_hex(&self.digest),
                })
            }
        }
    }
}
