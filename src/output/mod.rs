//! Duplicate records and the sinks they are written to.
//!
//! This module provides:
//! - [`DuplicateRecord`]: one detected duplicate paired with its original
//! - [`RecordFormat`]: how a record becomes a line (pair, path, JSON)
//! - [`ResultSink`]: an append-only line logger with `open`/`log`/`close`,
//!   backed by a file or by stdout (`--result -`)
//! - [`OpenSink`]: a guard that closes its sink exactly once
//!
//! # Example
//!
//! ```no_run
//! use deduplicate::output::{FileSink, OpenSink, RecordFormat, DuplicateRecord};
//!
//! let mut file = FileSink::new(FileSink::default_path());
//! let mut sink = OpenSink::open(&mut file).unwrap();
//! let record = DuplicateRecord::new("/a/x.txt".into(), "/b/x.txt".into(), [0u8; 32]);
//! sink.log(&record.render(RecordFormat::Pair).unwrap()).unwrap();
//! sink.close().unwrap();
//! ```

pub mod record;
pub mod sink;

pub use record::{DuplicateRecord, RecordFormat};
pub use sink::{
    is_stdout_target, sink_for, ConsoleSink, FileSink, OpenSink, ResultSink, STDOUT_TARGET,
};
