//! List command implementation

use anyhow::Result;
use colored::Colorize;
use mdocs_core::Document;
use serde::Serialize;
use std::io::Write;

use crate::output::{OutputFormat, write_json};

#[derive(Serialize)]
struct DocumentSummary<'a> {
    id: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    tags: &'a [String],
}

impl<'a> From<&'a Document> for DocumentSummary<'a> {
    fn from(doc: &'a Document) -> Self {
        Self {
            id: &doc.id,
            title: &doc.title,
            description: doc.description.as_deref(),
            category: doc.category.as_deref(),
            tags: &doc.tags,
        }
    }
}

/// Print `documents` in display order.
pub fn execute<W: Write>(documents: &[Document], format: OutputFormat, mut writer: W) -> Result<()> {
    if format.is_machine_readable() {
        let summaries: Vec<DocumentSummary<'_>> = documents.iter().map(DocumentSummary::from).collect();
        return write_json(writer, &summaries);
    }

    if documents.is_empty() {
        writeln!(writer, "{} No documents configured", "ℹ".blue())?;
        return Ok(());
    }

    for (i, doc) in documents.iter().enumerate() {
        write!(writer, "{:>3}. {} ({})", i + 1, doc.title.bold(), doc.id.dimmed())?;
        if let Some(category) = &doc.category {
            write!(writer, " [{}]", category.cyan())?;
        }
        if !doc.tags.is_empty() {
            let tags: Vec<String> = doc.tags.iter().map(|t| format!("#{t}")).collect();
            write!(writer, " {}", tags.join(" ").yellow())?;
        }
        writeln!(writer)?;
        if let Some(description) = &doc.description {
            writeln!(writer, "     {description}")?;
        }
    }
    Ok(())
}
