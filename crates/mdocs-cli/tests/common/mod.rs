#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(15);

/// `mdocs` command with an isolated cache directory and colors disabled.
#[allow(dead_code)]
pub fn mdocs_cmd(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("mdocs"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.env("MDOCS_DATA_DIR", data_dir);
    cmd.env_remove("MDOCS_CONFIG");
    cmd.env_remove("GITHUB_TOKEN");
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Site whose documents carry inline markdown.
#[allow(dead_code)]
pub fn write_content_site(dir: &Path) -> PathBuf {
    let path = dir.join("mdocs.toml");
    fs::write(
        &path,
        r##"
[source]
type = "content"

[[source.documents]]
id = "intro"
title = "Introduction"
content = "# Introduction\n\nWelcome to the widget manual."
order = 1
tags = ["start"]

[[source.documents]]
id = "internals"
title = "Widget Internals"
content = "How widgets are assembled."
category = "advanced"
"##,
    )
    .expect("write config");
    path
}

/// Site backed by markdown files in `dir/docs`.
#[allow(dead_code)]
pub fn write_local_site(dir: &Path) -> PathBuf {
    let docs = dir.join("docs");
    fs::create_dir_all(&docs).expect("create docs dir");
    fs::write(docs.join("setup.md"), "# Setup\n\nInstall the toolchain.\n").expect("write setup");
    fs::write(docs.join("usage.md"), "# Usage\n\nRun the binary.\n").expect("write usage");

    let path = dir.join("local.toml");
    fs::write(
        &path,
        format!(
            r#"
[source]
type = "local"
base_path = {base:?}

[[source.documents]]
id = "setup"
title = "Setup"
file = "setup.md"

[[source.documents]]
id = "usage"
title = "Usage"
file = "usage.md"

[cache]
storage_key = "local-site"
"#,
            base = docs.to_string_lossy()
        ),
    )
    .expect("write config");
    path
}
