use clap::Parser;
use deduplicate::cli::Cli;
use deduplicate::error::ExitCode;
use deduplicate::run_app;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

struct Workspace {
    _dir: TempDir,
    tree: PathBuf,
    state: PathBuf,
    result: PathBuf,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let tree = base.join("tree");
        let state = base.join("state");
        fs::create_dir(&tree).unwrap();
        fs::create_dir(&state).unwrap();
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

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.tree.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
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
            "--restart".into(),
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

    fn state_files_exist(&self) -> bool {
        self.state.join("deduplicate-list").exists() || self.state.join("deduplicate.lock").exists()
    }
}

fn pair(duplicate: &Path, original: &Path) -> String {
    format!("{} => {}", duplicate.display(), original.display())
}

#[test]
fn test_scan_three_copies_one_unique() {
    let ws = Workspace::new();
    let a = ws.write("a.txt", "same");
    let b = ws.write("b.txt", "same");
    let c = ws.write("c.txt", "same");
    ws.write("d.txt", "different");

    assert_eq!(ws.run(&[]).unwrap(), ExitCode::Success);
    assert_eq!(ws.records(), vec![pair(&b, &a), pair(&c, &a)]);
    assert!(!ws.state_files_exist());
}

#[test]
fn test_scan_empty_directory() {
    let ws = Workspace::new();

    assert_eq!(ws.run(&[]).unwrap(), ExitCode::Success);
    assert!(ws.records().is_empty());
    assert!(!ws.state_files_exist());
}

#[test]
fn test_scan_unique_files() {
    let ws = Workspace::new();
    ws.write("a.txt", "content a");
    ws.write("b.txt", "content b");

    assert_eq!(ws.run(&[]).unwrap(), ExitCode::Success);
    assert!(ws.records().is_empty());
}

#[test]
fn test_scan_nested_directories() {
    let ws = Workspace::new();
    let top = ws.write("a.txt", "nested");
    let deep = ws.write("sub/deeper/z.txt", "nested");

    ws.run(&[]).unwrap();
    assert_eq!(ws.records(), vec![pair(&deep, &top)]);
}

#[test]
fn test_scan_with_type_filter() {
    let ws = Workspace::new();
    let a = ws.write("a.jpg", "pic");
    let b = ws.write("b.jpg", "pic");
    ws.write("c.txt", "pic");
    ws.write("d.JPG", "pic");

    ws.run(&["--types", "jpg"]).unwrap();
    assert_eq!(ws.records(), vec![pair(&b, &a)]);
}

#[test]
fn test_scan_path_format() {
    let ws = Workspace::new();
    ws.write("a", "x");
    let b = ws.write("b", "x");

    ws.run(&["--format", "path"]).unwrap();
    assert_eq!(ws.records(), vec![b.display().to_string()]);
}

#[test]
fn test_scan_json_format_with_sha256() {
    let ws = Workspace::new();
    let a = ws.write("a", "abc");
    let b = ws.write("b", "abc");

    ws.run(&["--format", "json", "--algorithm", "sha256"]).unwrap();
    let records = ws.records();
    assert_eq!(records.len(), 1);

    let value: serde_json::Value = serde_json::from_str(&records[0]).unwrap();
    assert_eq!(value["original"], a.display().to_string());
    assert_eq!(value["duplicate"], b.display().to_string());
    assert_eq!(
        value["digest"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn test_concurrency_one_matches_ten() {
    let ws = Workspace::new();
    for i in 0..30 {
        ws.write(&format!("dir{}/f{i:02}.bin", i % 3), &format!("payload {}", i % 4));
    }

    ws.run(&["--concurrency", "1"]).unwrap();
    let serial = ws.records();
    fs::remove_file(&ws.result).unwrap();

    ws.run(&["--concurrency", "10"]).unwrap();
    assert_eq!(ws.records(), serial);
    assert_eq!(serial.len(), 30 - 4);
}

#[test]
fn test_result_file_is_appended() {
    let ws = Workspace::new();
    ws.write("a", "x");
    ws.write("b", "x");
    fs::write(&ws.result, "earlier\n").unwrap();

    ws.run(&[]).unwrap();
    let records = ws.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0], "earlier");
}

#[test]
fn test_rerun_is_idempotent() {
    let ws = Workspace::new();
    ws.write("a", "1");
    ws.write("b", "1");
    ws.write("c", "2");
    ws.write("d", "2");

    ws.run(&[]).unwrap();
    let first = ws.records();
    fs::remove_file(&ws.result).unwrap();
    ws.run(&[]).unwrap();
    assert_eq!(ws.records(), first);
}

#[test]
fn test_print_config_does_not_scan() {
    let ws = Workspace::new();
    ws.write("a", "x");
    ws.write("b", "x");

    assert_eq!(ws.run(&["--print-config"]).unwrap(), ExitCode::Success);
    assert!(!ws.result.exists());
    assert!(!ws.state_files_exist());
}

#[test]
fn test_config_file_is_applied() {
    let ws = Workspace::new();
    ws.write("a.md", "x");
    ws.write("b.md", "x");
    ws.write("c.txt", "x");
    fs::write(&ws.config, "types = \".txt\"\n").unwrap();

    ws.run(&[]).unwrap();
    assert!(ws.records().is_empty());
}

#[test]
fn test_stdout_result_target_writes_no_file() {
    let ws = Workspace::new();
    ws.write("a.txt", "same");
    ws.write("b.txt", "same");

    let args = [
        "deduplicate".to_string(),
        "--dir".into(),
        ws.tree.display().to_string(),
        "--result".into(),
        "-".into(),
        "--state-dir".into(),
        ws.state.display().to_string(),
        "--config".into(),
        ws.config.display().to_string(),
        "--restart".into(),
        "-q".into(),
    ];
    let code = run_app(Cli::try_parse_from(args).unwrap()).unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(!ws.result.exists());
    assert!(!Path::new("-").exists());
    assert!(!ws.state_files_exist());
}
