//! Show command implementation

use anyhow::Result;
use colored::Colorize;
use mdocs_core::Viewer;
use serde_json::json;
use std::io::Write;

use crate::output::{OutputFormat, write_json};

/// Print the markdown of document `id`.
///
/// Unknown ids and failed loads are reported on stderr; neither is an error.
pub async fn execute<W: Write>(viewer: &Viewer, id: &str, format: OutputFormat, mut writer: W) -> Result<()> {
    let content = match viewer.open(id).await {
        Ok(content) => content,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e.message());
            return Ok(());
        },
    };

    if format.is_machine_readable() {
        let title = viewer.document(id).map(|d| d.title.as_str());
        return write_json(
            writer,
            &json!({
                "id": id,
                "title": title,
                "loaded": !content.is_empty(),
                "content": content,
            }),
        );
    }

    if content.is_empty() {
        eprintln!("{} Document '{id}' could not be loaded", "⚠".yellow());
        return Ok(());
    }

    write!(writer, "{content}")?;
    if !content.ends_with('\n') {
        writeln!(writer)?;
    }
    Ok(())
}
