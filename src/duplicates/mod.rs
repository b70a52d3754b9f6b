//! Duplicate detection.
//!
//! This module provides functionality for:
//! - The per-scan digest index and its first-seen tie-break ([`DedupIndex`])
//! - Bounded-concurrency hashing of a work list ([`HashScheduler`])
//! - Resumable progress marks ([`FlushMarks`])

pub mod index;
pub mod scheduler;

pub use index::{Classification, DedupIndex};
pub use scheduler::{
    FlushMarks, HashFailurePolicy, HashScheduler, ScanOutcome, ScanState, ScanStats,
    SchedulerConfig, SchedulerError, DEFAULT_CONCURRENCY,
};
