//! Cache inspection and clearing

use anyhow::Result;
use colored::Colorize;
use mdocs_core::{CacheStats, Persistence, Viewer};
use serde_json::json;
use std::io::Write;

use crate::output::{OutputFormat, write_json};

/// Print cache size, capacity and memory estimate.
pub fn stats<W: Write>(viewer: &Viewer, format: OutputFormat, mut writer: W) -> Result<()> {
    render_stats(&viewer.cache_stats(), format, &mut writer)
}

fn render_stats<W: Write>(stats: &CacheStats, format: OutputFormat, writer: &mut W) -> Result<()> {
    if format.is_machine_readable() {
        return write_json(writer, stats);
    }

    writeln!(writer, "{}", "Document cache".bold())?;
    writeln!(writer, "  Documents:  {}/{}", stats.size, stats.capacity)?;
    writeln!(writer, "  Memory:     ~{}", format_bytes(stats.memory_estimate_bytes))?;
    writeln!(
        writer,
        "  Persistent: {}",
        if stats.persistent { "yes".green() } else { "no".yellow() }
    )?;
    Ok(())
}

/// Drop every cached document.
pub fn clear<W: Write>(viewer: &Viewer, format: OutputFormat, mut writer: W) -> Result<()> {
    let outcome = viewer.clear_cache();
    render_clear(&outcome, format, &mut writer)
}

fn render_clear<W: Write>(outcome: &Persistence, format: OutputFormat, writer: &mut W) -> Result<()> {
    if format.is_machine_readable() {
        let error = match outcome {
            Persistence::Failed(e) => Some(e.message()),
            _ => None,
        };
        return write_json(
            writer,
            &json!({ "cleared": true, "persisted": outcome.is_stored(), "error": error }),
        );
    }

    match outcome {
        Persistence::Failed(e) => writeln!(
            writer,
            "{} Cache cleared in memory, but the stored copy could not be removed: {}",
            "⚠".yellow(),
            e.message()
        )?,
        _ => writeln!(writer, "{} Cache cleared", "✓".green())?,
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KIB {
        format!("{bytes} B")
    } else if value < KIB * KIB {
        format!("{:.1} KiB", value / KIB)
    } else {
        format!("{:.1} MiB", value / (KIB * KIB))
    }
}
