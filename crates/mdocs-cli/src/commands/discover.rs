//! Discover command implementation

use anyhow::{Context, Result};
use colored::Colorize;
use mdocs_core::{DiscoveryOptions, HttpSettings, SiteConfig, SourceFetcher, discover_github};
use std::io::Write;
use std::time::Duration;

use crate::output::{OutputFormat, write_json};

/// List the markdown files under a GitHub directory and print a ready-to-use
/// site configuration.
///
/// The token is used for the request only and never printed.
pub async fn execute<W: Write>(
    path: &str,
    http: &HttpSettings,
    timeout: Duration,
    token: Option<&str>,
    format: OutputFormat,
    mut writer: W,
) -> Result<()> {
    let fetcher = SourceFetcher::from_settings(http)?;
    let mut options = DiscoveryOptions {
        timeout,
        ..DiscoveryOptions::default()
    };
    if let Some(token) = token {
        options
            .headers
            .insert("Authorization".to_string(), format!("Bearer {token}"));
    }

    let mut source = discover_github(&fetcher, path, &options)
        .await
        .with_context(|| format!("Failed to discover documents in {path}"))?;
    source.headers.clear();

    if format.is_machine_readable() {
        return write_json(writer, &source);
    }

    if source.documents.is_empty() {
        eprintln!("{} No markdown files found in {path}", "⚠".yellow());
    }
    let config = SiteConfig::new(source);
    write!(writer, "{}", config.to_toml_string()?)?;
    Ok(())
}
