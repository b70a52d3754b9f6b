use deduplicate::session::{
    CheckpointError, CheckpointStore, ExtensionFilter, PriorRun, SessionPaths, WorkListStore,
    LINE_ENDING, READ_BUFFER_SIZE,
};
use deduplicate::signal::CancellationToken;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn generate(store: &WorkListStore, paths: &[PathBuf]) {
    store
        .generate(
            paths.iter().cloned().map(Ok),
            &ExtensionFilter::allow_all(),
            &CancellationToken::new(),
        )
        .unwrap();
}

#[test]
fn test_offsets_address_every_line() {
    let dir = tempdir().unwrap();
    let store = WorkListStore::new(dir.path().join("deduplicate-list"));
    let paths: Vec<PathBuf> = (0..50)
        .map(|i| PathBuf::from(format!("/data/{}/file-{i}.bin", "x".repeat(i % 13))))
        .collect();
    generate(&store, &paths);

    let items: Vec<_> = store.open_for_read(0).unwrap().map(Result::unwrap).collect();
    assert_eq!(items.len(), paths.len());

    for (i, item) in items.iter().enumerate() {
        assert!(store.is_line_boundary(item.start).unwrap());
        let rest: Vec<PathBuf> = store
            .open_for_read(item.start)
            .unwrap()
            .map(|r| r.unwrap().path)
            .collect();
        assert_eq!(rest, paths[i..].to_vec());
    }
    assert_eq!(items.last().unwrap().end, store.len().unwrap());
}

#[test]
fn test_lines_longer_than_read_buffer() {
    let dir = tempdir().unwrap();
    let store = WorkListStore::new(dir.path().join("deduplicate-list"));
    let long = PathBuf::from(format!("/{}", "n".repeat(READ_BUFFER_SIZE * 3)));
    generate(&store, &[long.clone(), PathBuf::from("/short")]);

    let items: Vec<_> = store.open_for_read(0).unwrap().map(Result::unwrap).collect();
    assert_eq!(items[0].path, long);
    assert_eq!(items[1].start, items[0].end);
    assert_eq!(items[1].path, PathBuf::from("/short"));
}

#[test]
fn test_generate_appends() {
    let dir = tempdir().unwrap();
    let store = WorkListStore::new(dir.path().join("deduplicate-list"));
    generate(&store, &[PathBuf::from("/a")]);
    let first_len = store.len().unwrap();
    generate(&store, &[PathBuf::from("/b")]);

    let content = fs::read_to_string(store.path()).unwrap();
    assert_eq!(content, format!("/a{LINE_ENDING}/b{LINE_ENDING}"));
    assert!(store.is_line_boundary(first_len).unwrap());
}

#[test]
fn test_extension_filter_is_case_sensitive_suffix() {
    let dir = tempdir().unwrap();
    let store = WorkListStore::new(dir.path().join("deduplicate-list"));
    let paths = ["/p/a.txt", "/p/b.TXT", "/p/c.md", "/p/dtxt", "/p/e.txt"].map(PathBuf::from);
    let summary = store
        .generate(
            paths.iter().cloned().map(Ok),
            &ExtensionFilter::parse(".txt"),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(summary.listed, 2);
    assert_eq!(summary.filtered, 3);
    let listed: Vec<_> = store.open_for_read(0).unwrap().map(|r| r.unwrap().path).collect();
    assert_eq!(listed, vec![PathBuf::from("/p/a.txt"), PathBuf::from("/p/e.txt")]);
}

#[test]
fn test_checkpoint_round_trip_and_overwrite() {
    let dir = tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("deduplicate.lock"));
    assert!(!store.exists());

    store.save(42).unwrap();
    assert_eq!(fs::read_to_string(store.path()).unwrap().trim(), "42");
    store.save(7).unwrap();
    assert_eq!(store.load().unwrap(), 7);

    store.remove().unwrap();
    store.remove().unwrap();
    assert!(!store.exists());
}

#[test]
fn test_malformed_checkpoint() {
    let dir = tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("deduplicate.lock"));
    fs::write(store.path(), "-3").unwrap();

    assert!(matches!(store.load(), Err(CheckpointError::Malformed { .. })));
}

#[test]
fn test_prior_run_follows_files() {
    let dir = tempdir().unwrap();
    let paths = SessionPaths::in_dir(dir.path());
    assert_eq!(paths.prior_run(), PriorRun::None);

    generate(&WorkListStore::new(&paths.work_list), &[PathBuf::from("/a")]);
    assert_eq!(paths.prior_run(), PriorRun::ListWithoutCheckpoint);

    CheckpointStore::new(&paths.checkpoint).save(0).unwrap();
    assert_eq!(paths.prior_run(), PriorRun::Interrupted);

    WorkListStore::new(&paths.work_list).remove().unwrap();
    assert_eq!(paths.prior_run(), PriorRun::CheckpointWithoutList);
}
