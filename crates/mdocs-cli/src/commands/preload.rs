//! Preload command implementation

use anyhow::Result;
use colored::Colorize;
use mdocs_core::{PreloadReport, Viewer};
use std::io::Write;

use crate::output::{OutputFormat, write_json};

/// Preload `ids` (or every document) and summarize the outcome.
pub async fn execute<W: Write>(viewer: &Viewer, ids: &[String], format: OutputFormat, mut writer: W) -> Result<()> {
    let report = viewer.preload(ids).await;
    render(&report, format, &mut writer)
}

fn render<W: Write>(report: &PreloadReport, format: OutputFormat, writer: &mut W) -> Result<()> {
    if format.is_machine_readable() {
        return write_json(writer, report);
    }

    writeln!(
        writer,
        "{} Loaded {} document(s), {} already cached",
        "✓".green(),
        report.loaded.len(),
        report.skipped.len()
    )?;
    if !report.failed.is_empty() {
        writeln!(writer, "{} Failed: {}", "✗".red(), report.failed.join(", "))?;
    }
    if !report.missing.is_empty() {
        writeln!(writer, "{} Unknown ids: {}", "⚠".yellow(), report.missing.join(", "))?;
    }
    Ok(())
}
