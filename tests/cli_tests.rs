use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

fn bagit() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bagit"))
}

fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
}

#[test]
fn create_then_validate_round_trip() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("one.txt"), "hello\n");

    let create = bagit()
        .args(["bag", "create", "-b"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(create.status.success(), "{:?}", create);
    assert!(dir.path().join("data/one.txt").is_file());
    assert!(dir.path().join("bagit.txt").is_file());

    let validate = bagit()
        .args(["bag", "validate", "-b"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(validate.status.success(), "{:?}", validate);
    assert!(String::from_utf8_lossy(&validate.stdout).contains("valid"));
}

#[test]
fn validate_reports_failure_for_a_missing_bag_directory() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    let validate = bagit()
        .args(["bag", "validate", "-b"])
        .arg(&missing)
        .output()
        .unwrap();
    assert!(!validate.status.success());
}

#[test]
fn validate_detects_a_corrupted_payload_file() {
    let dir = tempdir().unwrap();
    write_file(&dir.path().join("one.txt"), "hello\n");

    let create = bagit()
        .args(["bag", "create", "-b"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(create.status.success());

    write_file(&dir.path().join("data/one.txt"), "tampered\n");

    let validate = bagit()
        .args(["bag", "validate", "-b"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(!validate.status.success());
}
