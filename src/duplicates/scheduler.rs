//! Bounded-concurrency hashing of a work list.
//!
//! # Overview
//!
//! [`HashScheduler`] reads a work list from a byte offset, hashes each listed
//! file on a rayon pool, and classifies the results against a [`DedupIndex`].
//!
//! One coordinator thread owns all scan state: the index, the statistics and
//! the [`FlushMarks`]. Pool workers only hash and send their result back over
//! a channel. Intake is credit based: at most `concurrency` lines are between
//! dispatch and classification at any time, and while that many are pending
//! no further line is read (the scan is `Paused`).
//!
//! Results are classified strictly in dispatch order. A completion that
//! overtakes an earlier line waits in a reorder buffer until every line
//! before it has been classified, so the original chosen for each digest is
//! the first one in the work list no matter how hashes interleave.
//!
//! # Cancellation
//!
//! When the token fires, intake stops and no further state is mutated. Jobs
//! already on the pool run to completion and their results are discarded.
//! The outcome carries the marks so the caller can checkpoint
//! [`FlushMarks::resume_offset`].

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use super::index::{Classification, DedupIndex};
use crate::output::{DuplicateRecord, OpenSink, RecordFormat};
use crate::progress::{ProgressCallback, PHASE_HASHING};
use crate::scanner::path_utils::shorten_path;
use crate::scanner::{digest_to_hex, ContentHasher, Digest, HashError};
use crate::session::{LineReader, WorkItem, WorkListError, WorkListStore};
use crate::signal::CancellationToken;

/// Default number of files hashed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Characters of a path shown in per-file debug lines.
const LOG_PATH_CHARS: usize = 40;

/// What to do when a readable file cannot be hashed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashFailurePolicy {
    /// Stop the scan with [`SchedulerError::Hash`]
    #[default]
    FailFast,
    /// Log the failure, count it and continue
    Skip,
}

/// Configuration for a [`HashScheduler`].
#[derive(Clone)]
pub struct SchedulerConfig {
    /// Maximum lines between dispatch and classification
    pub concurrency: usize,
    /// Handling of per-file hash failures
    pub failure_policy: HashFailurePolicy,
    /// Line format for duplicate records
    pub record_format: RecordFormat,
    /// Optional progress callback
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("concurrency", &self.concurrency)
            .field("failure_policy", &self.failure_policy)
            .field("record_format", &self.record_format)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            failure_policy: HashFailurePolicy::default(),
            record_format: RecordFormat::default(),
            progress_callback: None,
        }
    }
}

impl SchedulerConfig {
    /// Set the concurrency limit. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the hash failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: HashFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the record format.
    #[must_use]
    pub fn with_record_format(mut self, format: RecordFormat) -> Self {
        self.record_format = format;
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Not started
    Idle,
    /// Reading and dispatching lines
    Scanning,
    /// Concurrency limit reached, intake suspended
    Paused,
    /// Every line from the start offset was accounted for
    Completed,
    /// Cancelled before the end of the list
    Aborted,
}

/// The two most recent distinct flush-safe offsets.
///
/// `current` is the offset just past the last classified line. Only
/// `previous` is persisted on abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushMarks {
    /// Mark before the latest advance
    pub previous: u64,
    /// Latest mark
    pub current: u64,
}

impl FlushMarks {
    /// Marks for a scan starting at `offset`.
    #[must_use]
    pub fn new(offset: u64) -> Self {
        Self {
            previous: offset,
            current: offset,
        }
    }

    /// Record a new mark. Repeating the current mark changes nothing.
    pub fn advance(&mut self, offset: u64) {
        if offset != self.current {
            self.previous = self.current;
            self.current = offset;
        }
    }

    /// Offset a checkpoint should record.
    #[must_use]
    pub fn resume_offset(&self) -> u64 {
        self.previous
    }
}

/// Counters for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Files hashed and classified
    pub classified: u64,
    /// Files classified as originals
    pub originals: u64,
    /// Files classified as duplicates
    pub duplicates: u64,
    /// Listed files that no longer exist
    pub skipped_missing: u64,
    /// Files that could not be hashed (skip policy only)
    pub failed: u64,
    /// Bytes of content hashed
    pub bytes_hashed: u64,
    /// Bytes held by duplicates
    pub reclaimable_bytes: u64,
}

/// Result of [`HashScheduler::run`].
#[derive(Debug)]
pub struct ScanOutcome {
    /// `Completed` or `Aborted`
    pub state: ScanState,
    /// Digests seen during this run
    pub index: DedupIndex,
    /// Final flush marks
    pub marks: FlushMarks,
    /// Counters
    pub stats: ScanStats,
}

impl ScanOutcome {
    /// Whether the whole list was processed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == ScanState::Completed
    }
}

/// Errors that stop a scan.
#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    /// The work list could not be opened or read.
    #[error(transparent)]
    WorkList(#[from] WorkListError),

    /// A file could not be hashed under the fail-fast policy.
    #[error("Failed to hash {path}: {source}")]
    Hash {
        /// File that failed
        path: PathBuf,
        /// The hashing error
        #[source]
        source: HashError,
        /// Offset a checkpoint should record
        resume_offset: u64,
    },

    /// A duplicate record could not be written.
    #[error("Failed to write result: {source}")]
    Sink {
        /// The sink error
        #[source]
        source: std::io::Error,
        /// Offset a checkpoint should record
        resume_offset: u64,
    },

    /// The hashing pool could not be created.
    #[error("Failed to build hashing thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Workers stopped reporting results.
    #[error("Hash workers disconnected unexpectedly")]
    Disconnected,
}

impl SchedulerError {
    /// Offset to checkpoint for failures that happen mid-scan.
    #[must_use]
    pub fn resume_offset(&self) -> Option<u64> {
        match self {
            Self::Hash { resume_offset, .. } | Self::Sink { resume_offset, .. } => {
                Some(*resume_offset)
            }
            _ => None,
        }
    }
}

/// How a dispatched line ended.
#[derive(Debug)]
enum LineOutcome {
    Hashed { digest: Digest, size: u64 },
    Missing,
    Failed(HashError),
}

/// A line waiting in the reorder buffer.
#[derive(Debug)]
struct Completion {
    seq: u64,
    item: WorkItem,
    outcome: LineOutcome,
}

/// Coordinator-owned state for one run.
struct ScanSession {
    state: ScanState,
    index: DedupIndex,
    marks: FlushMarks,
    stats: ScanStats,
    ready: BTreeMap<u64, Completion>,
    next_seq: u64,
    next_to_classify: u64,
    /// Lines dispatched but not yet classified
    in_flight: usize,
    /// Pool jobs whose result has not been received
    outstanding: usize,
    exhausted: bool,
}

impl ScanSession {
    fn new(start_offset: u64) -> Self {
        Self {
            state: ScanState::Idle,
            index: DedupIndex::new(),
            marks: FlushMarks::new(start_offset),
            stats: ScanStats::default(),
            ready: BTreeMap::new(),
            next_seq: 0,
            next_to_classify: 0,
            in_flight: 0,
            outstanding: 0,
            exhausted: false,
        }
    }

    fn transition(&mut self, state: ScanState) {
        if self.state != state {
            log::trace!("Scan state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

/// Hashes a work list with bounded concurrency.
pub struct HashScheduler {
    hasher: Arc<dyn ContentHasher>,
    config: SchedulerConfig,
    token: CancellationToken,
}

impl std::fmt::Debug for HashScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashScheduler")
            .field("hasher", &self.hasher.name())
            .field("config", &self.config)
            .field("token", &self.token)
            .finish()
    }
}

impl HashScheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new(hasher: Arc<dyn ContentHasher>, config: SchedulerConfig) -> Self {
        Self {
            hasher,
            config,
            token: CancellationToken::new(),
        }
    }

    /// Observe `token` at every step of the scan.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Process every line of `list` from `start_offset` to the end.
    ///
    /// Duplicate records are written to `sink` as they are classified.
    /// Cancellation is not an error: it yields an `Aborted` outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::WorkList`] if the list cannot be read,
    /// [`SchedulerError::Hash`] on a hash failure under
    /// [`HashFailurePolicy::FailFast`] and [`SchedulerError::Sink`] if a
    /// record cannot be written.
    pub fn run(
        &self,
        list: &WorkListStore,
        start_offset: u64,
        sink: &mut OpenSink<'_>,
    ) -> Result<ScanOutcome, SchedulerError> {
        let total = list.len()?;
        let mut reader = list.open_for_read(start_offset)?;
        let limit = self.config.concurrency.max(1);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(limit)
            .thread_name(|i| format!("dedup-hash-{i}"))
            .build()?;

        log::debug!(
            "Hashing {} from byte {start_offset} of {total} ({} at a time, {})",
            list.path().display(),
            limit,
            self.hasher.name()
        );
        if let Some(ref progress) = self.config.progress_callback {
            progress.on_phase_start(PHASE_HASHING, total, start_offset);
        }

        let (tx, rx) = mpsc::channel();
        let mut session = ScanSession::new(start_offset);
        let result = self.drive(&pool, &tx, &rx, &mut reader, &mut session, sink, limit);

        // Let jobs already on the pool finish; their results are dropped.
        drop(tx);
        let discarded = rx.iter().count();
        if discarded > 0 {
            log::debug!("Discarded {discarded} hash results after the scan stopped");
        }

        if let Some(ref progress) = self.config.progress_callback {
            progress.on_phase_end(PHASE_HASHING);
        }

        result.map(|()| ScanOutcome {
            state: session.state,
            index: session.index,
            marks: session.marks,
            stats: session.stats,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn drive(
        &self,
        pool: &rayon::ThreadPool,
        tx: &Sender<Completion>,
        rx: &Receiver<Completion>,
        reader: &mut LineReader,
        session: &mut ScanSession,
        sink: &mut OpenSink<'_>,
        limit: usize,
    ) -> Result<(), SchedulerError> {
        session.transition(ScanState::Scanning);

        loop {
            while !session.exhausted && session.in_flight < limit && !self.token.is_cancelled() {
                session.transition(ScanState::Scanning);
                match reader.next() {
                    Some(item) => self.dispatch(pool, tx, session, item?),
                    None => session.exhausted = true,
                }
            }
            if session.in_flight >= limit {
                session.transition(ScanState::Paused);
            }

            if !self.classify_ready(session, sink)? {
                session.transition(ScanState::Aborted);
                return Ok(());
            }

            if session.in_flight == 0 {
                if session.exhausted {
                    session.transition(ScanState::Completed);
                    return Ok(());
                }
                continue;
            }
            if session.outstanding == 0 {
                continue;
            }

            let completion = rx.recv().map_err(|_| SchedulerError::Disconnected)?;
            session.outstanding -= 1;
            if self.token.is_cancelled() {
                session.transition(ScanState::Aborted);
                return Ok(());
            }
            session.ready.insert(completion.seq, completion);
        }
    }

    fn dispatch(
        &self,
        pool: &rayon::ThreadPool,
        tx: &Sender<Completion>,
        session: &mut ScanSession,
        item: WorkItem,
    ) {
        let seq = session.next_seq;
        session.next_seq += 1;
        session.in_flight += 1;

        if !item.path.exists() {
            session.ready.insert(
                seq,
                Completion {
                    seq,
                    item,
                    outcome: LineOutcome::Missing,
                },
            );
            return;
        }

        session.outstanding += 1;
        let hasher = Arc::clone(&self.hasher);
        let tx = tx.clone();
        pool.spawn(move || {
            let outcome = hash_line(hasher.as_ref(), &item);
            // The receiver is gone only after the scan stopped.
            let _ = tx.send(Completion { seq, item, outcome });
        });
    }

    /// Classify buffered results in dispatch order. Returns `false` if the
    /// scan was cancelled.
    fn classify_ready(
        &self,
        session: &mut ScanSession,
        sink: &mut OpenSink<'_>,
    ) -> Result<bool, SchedulerError> {
        loop {
            if self.token.is_cancelled() {
                return Ok(false);
            }
            let Some(done) = session.ready.remove(&session.next_to_classify) else {
                return Ok(true);
            };
            let Completion { item, outcome, .. } = done;

            match outcome {
                LineOutcome::Missing => {
                    log::debug!("Skipping vanished file {}", item.path.display());
                    session.stats.skipped_missing += 1;
                }
                LineOutcome::Failed(source) => match self.config.failure_policy {
                    HashFailurePolicy::FailFast => {
                        return Err(SchedulerError::Hash {
                            path: item.path,
                            source,
                            resume_offset: session.marks.resume_offset(),
                        });
                    }
                    HashFailurePolicy::Skip => {
                        log::warn!("Skipping unhashable file: {source}");
                        session.stats.failed += 1;
                    }
                },
                LineOutcome::Hashed { digest, size } => {
                    log::debug!(
                        "Hashing \"{}\" -> {}",
                        shorten_path(&item.path.to_string_lossy(), LOG_PATH_CHARS),
                        digest_to_hex(&digest)
                    );
                    self.classify(session, sink, &item, digest, size)?;
                }
            }

            session.marks.advance(item.end);
            session.next_to_classify += 1;
            session.in_flight -= 1;
            if let Some(ref progress) = self.config.progress_callback {
                progress.on_progress(item.end, &item.path.to_string_lossy());
            }
        }
    }

    fn classify(
        &self,
        session: &mut ScanSession,
        sink: &mut OpenSink<'_>,
        item: &WorkItem,
        digest: Digest,
        size: u64,
    ) -> Result<(), SchedulerError> {
        session.stats.classified += 1;
        session.stats.bytes_hashed += size;

        match session.index.classify(digest, &item.path) {
            Classification::Original => session.stats.originals += 1,
            Classification::Duplicate { original } => {
                let resume_offset = session.marks.resume_offset();
                let record = DuplicateRecord::new(original, item.path.clone(), digest);
                let line = record
                    .render(self.config.record_format)
                    .map_err(|e| SchedulerError::Sink {
                        source: e.into(),
                        resume_offset,
                    })?;
                sink.log(&line).map_err(|source| SchedulerError::Sink {
                    source,
                    resume_offset,
                })?;
                session.stats.duplicates += 1;
                session.stats.reclaimable_bytes += size;
            }
        }
        Ok(())
    }
}

fn hash_line(hasher: &dyn ContentHasher, item: &WorkItem) -> LineOutcome {
    let size = match fs::metadata(&item.path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LineOutcome::Missing,
        Err(e) => return LineOutcome::Failed(HashError::from_io(&item.path, e)),
    };
    match hasher.hash_file(&item.path) {
        Ok(digest) => LineOutcome::Hashed { digest, size },
        Err(e) if e.is_not_found() => LineOutcome::Missing,
        Err(e) => LineOutcome::Failed(e),
    }
}
