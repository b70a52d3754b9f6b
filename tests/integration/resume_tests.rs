use clap::Parser;
use deduplicate::cli::Cli;
use deduplicate::duplicates::{HashScheduler, ScanState, SchedulerConfig};
use deduplicate::error::{exit_code_for, ExitCode};
use deduplicate::output::{FileSink, OpenSink};
use deduplicate::resume::{Prompt, ResumeChoice, ResumeController, StartMode, Termination};
use deduplicate::run_app;
use deduplicate::scanner::{Blake3Hasher, ContentHasher, Digest, HashError, PathLister, WalkerConfig};
use deduplicate::session::{CheckpointStore, ExtensionFilter, SessionPaths, WorkListStore};
use deduplicate::signal::CancellationToken;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// Cancels the scan while hashing its `cancel_at`-th file.
struct InterruptingHasher {
    calls: AtomicUsize,
    cancel_at: usize,
    token: CancellationToken,
}

impl ContentHasher for InterruptingHasher {
    fn hash_file(&self, path: &Path) -> Result<Digest, HashError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_at {
            self.token.cancel();
        }
        Blake3Hasher.hash_file(path)
    }

    fn name(&self) -> &'static str {
        "interrupting"
    }
}

struct Fixture {
    _dir: TempDir,
    tree: PathBuf,
    state: PathBuf,
    result: PathBuf,
    config: PathBuf,
}

impl Fixture {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let tree = base.join("tree");
        let state = base.join("state");
        fs::create_dir(&tree).unwrap();
        fs::create_dir(&state).unwrap();
        for (name, content) in files {
            fs::write(tree.join(name), content).unwrap();
        }
        let config = base.join("config.toml");
        fs::write(&config, "").unwrap();
        Self {
            _dir: dir,
            tree,
            result: base.join("results.txt"),
            state,
            config,
        }
    }

    fn paths(&self) -> SessionPaths {
        SessionPaths::in_dir(&self.state)
    }

    fn file(&self, name: &str) -> PathBuf {
        self.tree.join(name)
    }

    fn list(&self) -> WorkListStore {
        let store = WorkListStore::new(self.paths().work_list);
        let lister = PathLister::new(&self.tree, WalkerConfig::default()).unwrap();
        store
            .generate(
                lister.enumerate(),
                &ExtensionFilter::allow_all(),
                &CancellationToken::new(),
            )
            .unwrap();
        store
    }

    /// Scan at concurrency 1 and get interrupted while hashing file `cancel_at`.
    fn interrupted_scan(&self, cancel_at: usize) -> u64 {
        let list = self.list();
        let token = CancellationToken::new();
        let hasher = InterruptingHasher {
            calls: AtomicUsize::new(0),
            cancel_at,
            token: token.clone(),
        };
        let scheduler = HashScheduler::new(
            Arc::new(hasher),
            SchedulerConfig::default().with_concurrency(1),
        )
        .with_cancellation(token);

        let mut file = FileSink::new(&self.result);
        let mut sink = OpenSink::open(&mut file).unwrap();
        let outcome = scheduler.run(&list, 0, &mut sink).unwrap();
        sink.close().unwrap();
        assert_eq!(outcome.state, ScanState::Aborted);

        let resume_offset = outcome.marks.resume_offset();
        ResumeController::new(self.paths(), ResumeChoice::Ask)
            .shutdown(Termination::Interrupted { resume_offset })
            .unwrap();
        resume_offset
    }

    fn run(&self, extra: &[&str]) -> anyhow::Result<ExitCode> {
        let mut args: Vec<String> = vec![
            "deduplicate".into(),
            "--dir".into(),
            self.tree.display().to_string(),
            "--result".into(),
            self.result.display().to_string(),
            "--state-dir".into(),
            self.state.display().to_string(),
            "--config".into(),
            self.config.display().to_string(),
            "-q".into(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        run_app(Cli::try_parse_from(args).unwrap())
    }

    fn records(&self) -> Vec<String> {
        fs::read_to_string(&self.result)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn pair(duplicate: &Path, original: &Path) -> String {
    format!("{} => {}", duplicate.display(), original.display())
}

#[test]
fn test_interrupt_writes_previous_mark() {
    let fx = Fixture::new(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
    let offset = fx.interrupted_scan(3);

    let first_line = format!("{}\n", fx.file("a").display()).len() as u64;
    let expected = if cfg!(windows) { first_line + 1 } else { first_line };
    assert_eq!(offset, expected);
    assert_eq!(CheckpointStore::new(fx.paths().checkpoint).load().unwrap(), offset);
    assert!(fx.paths().work_list.exists());
}

#[test]
fn test_resume_finishes_and_cleans_up() {
    let fx = Fixture::new(&[("a", "x"), ("b", "x"), ("c", "x"), ("d", "x"), ("e", "x")]);
    fx.interrupted_scan(3);
    assert_eq!(fx.records(), vec![pair(&fx.file("b"), &fx.file("a"))]);

    assert_eq!(fx.run(&["--resume"]).unwrap(), ExitCode::Success);

    // The resumed run starts at "b"; the index is rebuilt from there.
    assert_eq!(
        fx.records(),
        vec![
            pair(&fx.file("b"), &fx.file("a")),
            pair(&fx.file("c"), &fx.file("b")),
            pair(&fx.file("d"), &fx.file("b")),
            pair(&fx.file("e"), &fx.file("b")),
        ]
    );
    assert!(!fx.paths().work_list.exists());
    assert!(!fx.paths().checkpoint.exists());
}

#[test]
fn test_resume_uses_stored_list_not_tree() {
    let fx = Fixture::new(&[("a", "x"), ("b", "y"), ("c", "x"), ("d", "y")]);
    fx.interrupted_scan(2);

    fs::write(fx.file("e"), "x").unwrap();
    fs::remove_file(fx.file("c")).unwrap();

    fx.run(&["--resume"]).unwrap();
    assert_eq!(fx.records(), vec![pair(&fx.file("d"), &fx.file("b"))]);
}

#[test]
fn test_restart_discards_checkpoint() {
    let fx = Fixture::new(&[("a", "x"), ("b", "x"), ("c", "x")]);
    fx.interrupted_scan(2);
    fs::remove_file(&fx.result).unwrap();

    fx.run(&["--restart"]).unwrap();
    assert_eq!(
        fx.records(),
        vec![
            pair(&fx.file("b"), &fx.file("a")),
            pair(&fx.file("c"), &fx.file("a")),
        ]
    );
    assert!(!fx.paths().checkpoint.exists());
}

#[test]
fn test_resume_without_checkpoint_is_setup_error() {
    let fx = Fixture::new(&[("a", "x")]);
    fx.list();

    let err = fx.run(&["--resume"]).unwrap_err();
    assert_eq!(exit_code_for(&err), ExitCode::SetupError);
    assert!(fx.paths().work_list.exists());
}

#[test]
fn test_orphan_checkpoint_is_setup_error() {
    let fx = Fixture::new(&[("a", "x"), ("b", "x")]);
    CheckpointStore::new(fx.paths().checkpoint).save(0).unwrap();

    let err = fx.run(&["--resume"]).unwrap_err();
    assert_eq!(exit_code_for(&err), ExitCode::SetupError);
    assert!(!fx.result.exists());

    assert_eq!(fx.run(&["--restart"]).unwrap(), ExitCode::Success);
    assert_eq!(fx.records().len(), 1);
}

#[test]
fn test_checkpoint_inside_line_is_setup_error() {
    let fx = Fixture::new(&[("a", "x"), ("b", "x")]);
    fx.list();
    CheckpointStore::new(fx.paths().checkpoint).save(3).unwrap();

    let err = fx.run(&["--resume"]).unwrap_err();
    assert_eq!(exit_code_for(&err), ExitCode::SetupError);
}

#[test]
fn test_listing_interrupt_leaves_no_state() {
    let fx = Fixture::new(&[("a", "x"), ("b", "x")]);
    let token = CancellationToken::new();
    token.cancel();

    let store = WorkListStore::new(fx.paths().work_list);
    let lister = PathLister::new(&fx.tree, WalkerConfig::default())
        .unwrap()
        .with_cancellation(token.clone());
    let summary = store
        .generate(lister.enumerate(), &ExtensionFilter::allow_all(), &token)
        .unwrap();
    assert!(summary.interrupted);

    ResumeController::new(fx.paths(), ResumeChoice::Ask)
        .shutdown(Termination::ListingInterrupted)
        .unwrap();
    assert_eq!(fx.paths().prior_run(), deduplicate::session::PriorRun::None);
}

/// Answers "start over" after a termination signal arrived mid-question.
struct SignalledPrompt {
    token: CancellationToken,
}

impl Prompt for SignalledPrompt {
    fn confirm_resume(&mut self, _work_list: &Path) -> std::io::Result<bool> {
        self.token.cancel();
        Ok(false)
    }
}

#[test]
fn test_signal_at_prompt_keeps_resumable_state() {
    let fx = Fixture::new(&[("a", "same"), ("b", "same"), ("c", "other")]);
    let resume_offset = fx.interrupted_scan(2);

    let token = CancellationToken::new();
    let controller =
        ResumeController::new(fx.paths(), ResumeChoice::Ask).with_cancellation(token.clone());
    let mode = controller
        .prepare(&mut SignalledPrompt { token })
        .unwrap();

    assert_eq!(mode, StartMode::Cancelled);
    assert_eq!(
        fx.paths().prior_run(),
        deduplicate::session::PriorRun::Interrupted
    );
    assert_eq!(
        CheckpointStore::new(fx.paths().checkpoint).load().unwrap(),
        resume_offset
    );

    // The kept state still resumes to completion.
    assert_eq!(fx.run(&["--resume"]).unwrap(), ExitCode::Success);
    assert_eq!(fx.paths().prior_run(), deduplicate::session::PriorRun::None);
}
