#![allow(clippy::unwrap_used)]

mod common;

use common::{mdocs_cmd, write_content_site, write_local_site};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn list_prints_documents_in_order() {
    let dir = TempDir::new().unwrap();
    let config = write_content_site(dir.path());

    mdocs_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("1. Introduction (intro)"))
        .stdout(predicate::str::contains("2. Widget Internals (internals) [advanced]"));
}

#[test]
fn list_json_is_parseable() {
    let dir = TempDir::new().unwrap();
    let config = write_content_site(dir.path());

    let output = mdocs_cmd(dir.path())
        .args(["--format", "json", "list", "--config"])
        .arg(&config)
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 2);
    assert_eq!(value[0]["id"], "intro");
}

#[test]
fn show_prints_markdown() {
    let dir = TempDir::new().unwrap();
    let config = write_content_site(dir.path());

    mdocs_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["show", "intro"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("# Introduction"));
}

#[test]
fn show_unknown_id_reports_on_stderr() {
    let dir = TempDir::new().unwrap();
    let config = write_content_site(dir.path());

    mdocs_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["show", "missing"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Document not found: missing"));
}

#[test]
fn search_finds_inline_content() {
    let dir = TempDir::new().unwrap();
    let config = write_content_site(dir.path());

    mdocs_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["search", "widget"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Widget Internals (internals) 3.80"))
        .stdout(predicate::str::contains("Introduction (intro) 1.00"));
}

#[test]
fn search_without_matches() {
    let dir = TempDir::new().unwrap();
    let config = write_content_site(dir.path());

    mdocs_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["search", "nonexistent"])
        .assert()
        .success()
        .stdout("No results for 'nonexistent'\n");
}

#[test]
fn local_documents_persist_between_runs() {
    // Given: A file-backed site preloaded into the cache
    let dir = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let config = write_local_site(dir.path());

    mdocs_cmd(data.path())
        .arg("--config")
        .arg(&config)
        .arg("preload")
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 2 document(s), 0 already cached"));

    // When: The source file disappears
    fs::remove_file(dir.path().join("docs").join("setup.md")).unwrap();

    // Then: A new process still serves and searches it from the cache
    mdocs_cmd(data.path())
        .arg("--config")
        .arg(&config)
        .args(["show", "setup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Install the toolchain."));

    mdocs_cmd(data.path())
        .arg("--config")
        .arg(&config)
        .args(["search", "toolchain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Setup (setup)"));
}

#[test]
fn cache_stats_and_clear() {
    let dir = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let config = write_local_site(dir.path());

    mdocs_cmd(data.path())
        .arg("--config")
        .arg(&config)
        .args(["preload", "usage"])
        .assert()
        .success();

    let output = mdocs_cmd(data.path())
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "cache", "stats"])
        .output()
        .unwrap();
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["size"], 1);
    assert_eq!(stats["capacity"], 50);
    assert_eq!(stats["persistent"], true);

    mdocs_cmd(data.path())
        .arg("--config")
        .arg(&config)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleared"));

    mdocs_cmd(data.path())
        .arg("--config")
        .arg(&config)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Documents:  0/50"));
}

#[test]
fn preload_reports_unknown_ids() {
    let dir = TempDir::new().unwrap();
    let config = write_content_site(dir.path());

    mdocs_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["preload", "intro", "ghost"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unknown ids: ghost"));
}
