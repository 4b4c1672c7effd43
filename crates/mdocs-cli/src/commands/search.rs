//! Search command implementation

use anyhow::Result;
use colored::Colorize;
use mdocs_core::{SearchHit, SearchOptions, Viewer};
use serde::Serialize;
use std::io::Write;

use crate::output::{OutputFormat, write_json};

/// Parsed search flags.
#[derive(Debug, Clone)]
pub struct SearchArgs {
    pub query: String,
    pub limit: usize,
    pub fuzzy: bool,
    pub no_tags: bool,
    pub case_sensitive: bool,
}

impl SearchArgs {
    fn options(&self) -> SearchOptions {
        SearchOptions {
            search_in_tags: !self.no_tags,
            fuzzy_search: self.fuzzy,
            case_sensitive: self.case_sensitive,
            max_results: self.limit,
        }
    }
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    results: Vec<ResultRow<'a>>,
}

#[derive(Serialize)]
struct ResultRow<'a> {
    id: &'a str,
    title: &'a str,
    score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
}

/// Search the viewer's index and print ranked results.
pub fn execute<W: Write>(viewer: &Viewer, args: &SearchArgs, format: OutputFormat, mut writer: W) -> Result<()> {
    let hits = viewer.search(&args.query, &args.options());
    render(&args.query, &hits, format, &mut writer)
}

fn render<W: Write>(query: &str, hits: &[SearchHit], format: OutputFormat, writer: &mut W) -> Result<()> {
    if format.is_machine_readable() {
        let output = SearchOutput {
            query,
            results: hits
                .iter()
                .map(|hit| ResultRow {
                    id: &hit.document.id,
                    title: &hit.document.title,
                    score: hit.score,
                    category: hit.document.category.as_deref(),
                })
                .collect(),
        };
        return write_json(writer, &output);
    }

    if hits.is_empty() {
        writeln!(writer, "No results for '{query}'")?;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        writeln!(
            writer,
            "{:>3}. {} ({}) {}",
            i + 1,
            hit.document.title.bold(),
            hit.document.id.dimmed(),
            format!("{:.2}", hit.score).green()
        )?;
        if let Some(description) = &hit.document.description {
            writeln!(writer, "     {description}")?;
        }
    }
    Ok(())
}
