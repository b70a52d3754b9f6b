//! Streaming content hashers.
//!
//! # Overview
//!
//! [`ContentHasher`] turns a file into a fixed-size [`Digest`]. Two
//! implementations are provided:
//!
//! - [`Blake3Hasher`]: the default. Streams small files, memory-maps files of
//!   at least [`MMAP_THRESHOLD`] bytes.
//! - [`Sha256Hasher`]: streams through a fixed buffer.
//!
//! Hashers are shared across the worker pool, so they are `Send + Sync` and
//! hold no per-file state.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use super::HashError;

/// A 32-byte content digest.
pub type Digest = [u8; 32];

/// Files at least this large are hashed through a memory map.
pub const MMAP_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Read buffer for streaming hashers.
const BUFFER_SIZE: usize = 64 * 1024;

/// Computes a content digest for a file.
pub trait ContentHasher: Send + Sync {
    /// Hash the full content of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::NotFound`] if the file vanished, and
    /// [`HashError::PermissionDenied`] / [`HashError::Io`] if it cannot be read.
    fn hash_file(&self, path: &Path) -> Result<Digest, HashError>;

    /// Short algorithm name for logs.
    fn name(&self) -> &'static str;
}

/// Available content hash algorithms.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3 (default)
    #[default]
    Blake3,
    /// SHA-256
    Sha256,
}

impl HashAlgorithm {
    /// Build the hasher for this algorithm.
    #[must_use]
    pub fn hasher(self) -> Arc<dyn ContentHasher> {
        match self {
            Self::Blake3 => Arc::new(Blake3Hasher),
            Self::Sha256 => Arc::new(Sha256Hasher),
        }
    }
}

/// BLAKE3 file hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl ContentHasher for Blake3Hasher {
    fn hash_file(&self, path: &Path) -> Result<Digest, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| HashError::from_io(path, e))?
            .len();

        let mut hasher = blake3::Hasher::new();
        if len >= MMAP_THRESHOLD {
            drop(file);
            hasher
                .update_mmap(path)
                .map_err(|e| HashError::from_io(path, e))?;
        } else {
            hasher
                .update_reader(file)
                .map_err(|e| HashError::from_io(path, e))?;
        }
        Ok(*hasher.finalize().as_bytes())
    }

    fn name(&self) -> &'static str {
        "blake3"
    }
}

/// SHA-256 file hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn hash_file(&self, path: &Path) -> Result<Digest, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let n = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            hasher.update(&buffer[..n]);
        }

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Ok(digest)
    }

    fn name(&self) -> &'static str {
        "sha256"
    }
}

/// Lowercase hex encoding of a digest.
#[must_use]
pub fn digest_to_hex(digest: &Digest) -> String {
    use std::fmt::Write;

    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}
