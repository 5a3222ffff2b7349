use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn create_store() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(root.join("docs/readme.txt"), "hello world").unwrap();
    fs::write(root.join("notes.txt"), "ABCD").unwrap();
    temp
}

fn write_plan(dir: &Path, plan: &str) -> std::path::PathBuf {
    let file = dir.join("plan.toml");
    fs::write(&file, plan).unwrap();
    file
}

const PLAN: &str = r#"
[[op]]
kind = "write"
path = "/docs/new.txt"
content = "fresh"

[[op]]
kind = "move"
from = "/notes.txt"
to = "/archive/notes.txt"

[[op]]
kind = "delete"
path = "/docs/readme.txt"
"#;

#[test]
fn test_apply_commits_plan() {
    let temp = create_store();
    let plan = write_plan(temp.path(), PLAN);

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(temp.path().join("store"))
        .arg("apply")
        .arg(&plan)
        .assert()
        .success()
        .stdout(predicate::str::contains("Successfully committed 3 operations"));

    let root = temp.path().join("store");
    assert_eq!(fs::read_to_string(root.join("docs/new.txt")).unwrap(), "fresh");
    assert_eq!(
        fs::read_to_string(root.join("archive/notes.txt")).unwrap(),
        "ABCD"
    );
    assert!(!root.join("notes.txt").exists());
    assert!(!root.join("docs/readme.txt").exists());

    // Staging is cleaned up
    let staging = temp.path().join("store.staging");
    assert_eq!(fs::read_dir(staging).unwrap().count(), 0);
}

#[test]
fn test_apply_dry_run_changes_nothing() {
    let temp = create_store();
    let plan = write_plan(temp.path(), PLAN);

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(temp.path().join("store"))
        .arg("apply")
        .arg(&plan)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN"));

    let root = temp.path().join("store");
    assert!(!root.join("docs/new.txt").exists());
    assert!(root.join("notes.txt").exists());
    assert!(root.join("docs/readme.txt").exists());
}

#[test]
fn test_apply_invalid_plan_rolls_back() {
    let temp = create_store();
    let plan = write_plan(
        temp.path(),
        r#"
[[op]]
kind = "write"
path = "/written.txt"
content = "x"

[[op]]
kind = "delete"
path = "/does-not-exist"
"#,
    );

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(temp.path().join("store"))
        .arg("apply")
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Rollback successful"))
        .stderr(predicate::str::contains("does not exist"));

    assert!(!temp.path().join("store/written.txt").exists());
}

#[test]
fn test_apply_rejects_checksum_mismatch() {
    let temp = create_store();
    let plan = write_plan(
        temp.path(),
        r#"
[[op]]
kind = "write"
path = "/notes.txt"
content = "WXYZ"
md5 = "cb08ca4a7bb5f9683c19133a84872ca7"
"#,
    );

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(temp.path().join("store"))
        .arg("apply")
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("checksum mismatch"));

    assert_eq!(
        fs::read_to_string(temp.path().join("store/notes.txt")).unwrap(),
        "ABCD"
    );
}

#[test]
fn test_apply_rejects_path_traversal() {
    let temp = create_store();
    let plan = write_plan(
        temp.path(),
        "[[op]]\nkind = \"delete\"\npath = \"/docs/../../etc\"\n",
    );

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(temp.path().join("store"))
        .arg("apply")
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid path"));
}

#[test]
fn test_ls_recursive() {
    let temp = create_store();

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(temp.path().join("store"))
        .arg("ls")
        .arg("-r")
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("/docs/"))
        .stdout(predicate::str::contains("/docs/readme.txt"))
        .stdout(predicate::str::contains("/notes.txt"));
}

#[test]
fn test_cat_range() {
    let temp = create_store();

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(temp.path().join("store"))
        .arg("cat")
        .arg("/docs/readme.txt")
        .arg("--offset")
        .arg("6")
        .assert()
        .success()
        .stdout("world");

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(temp.path().join("store"))
        .arg("cat")
        .arg("docs/readme.txt")
        .arg("--offset")
        .arg("0")
        .arg("--length")
        .arg("5")
        .assert()
        .success()
        .stdout("hello");
}

#[test]
fn test_cat_errors() {
    let temp = create_store();
    let root = temp.path().join("store");

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(&root)
        .arg("cat")
        .arg("/docs")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Illegal operation"));

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(&root)
        .arg("cat")
        .arg("/notes.txt")
        .arg("--offset")
        .arg("2")
        .arg("--length")
        .arg("10")
        .assert()
        .failure();

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(&root)
        .arg("cat")
        .arg("/notes.txt")
        .arg("--offset=-1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("negative"));
}

#[test]
fn test_free() {
    let temp = create_store();

    cargo_bin_cmd!("txfs")
        .arg("--root")
        .arg(temp.path().join("store"))
        .arg("free")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total"))
        .stdout(predicate::str::contains("Free"));
}

#[test]
fn test_config_file_supplies_root() {
    let temp = create_store();
    let config = temp.path().join("custom.toml");
    fs::write(&config, "storage_root = \"store\"\n").unwrap();

    cargo_bin_cmd!("txfs")
        .arg("--config")
        .arg(&config)
        .arg("cat")
        .arg("/notes.txt")
        .assert()
        .success()
        .stdout("ABCD");
}

#[test]
fn test_missing_root_is_config_error() {
    let temp = TempDir::new().unwrap();

    cargo_bin_cmd!("txfs")
        .current_dir(temp.path())
        .env_remove("TXFS_CONFIG")
        .env_remove("TXFS_ROOT")
        .arg("free")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no storage root configured"));
}
