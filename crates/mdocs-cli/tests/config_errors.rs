#![allow(clippy::unwrap_used)]

mod common;

use common::mdocs_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn missing_config_fails() {
    let dir = TempDir::new().unwrap();

    mdocs_cmd(dir.path())
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load site configuration"));
}

#[test]
fn malformed_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("mdocs.toml");
    fs::write(&config, "[source\ntype = ").unwrap();

    mdocs_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn source_without_documents_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("mdocs.toml");
    fs::write(&config, "[source]\ntype = \"url\"\nbase_url = \"https://docs.example.com\"\n").unwrap();

    mdocs_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("url source has no documents"));
}

#[test]
fn config_path_from_environment() {
    let dir = TempDir::new().unwrap();
    let config = common::write_content_site(dir.path());

    mdocs_cmd(dir.path())
        .env("MDOCS_CONFIG", &config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Introduction"));
}
