//! # CLI Structure and Argument Parsing
//!
//! `mdocs` browses one documentation site described by a TOML file
//! (`--config`, default `mdocs.toml`).
//!
//! ## Usage Patterns
//!
//! ```bash
//! mdocs list
//! mdocs show getting-started
//! mdocs search "install rust" --fuzzy --limit 5
//! mdocs preload                 # every document
//! mdocs cache stats
//! mdocs discover rust-lang/book/main/src --format json
//! ```
//!
//! Exit status is non-zero only when the site configuration cannot be used.

use crate::output::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Markdown documentation viewer
#[derive(Parser, Clone, Debug)]
#[command(name = "mdocs", version, about, long_about = None)]
pub struct Cli {
    /// Site configuration file
    #[arg(long, global = true, env = "MDOCS_CONFIG", default_value = "mdocs.toml")]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List the site's documents
    List,

    /// Print a document's markdown
    Show {
        /// Document id
        id: String,
    },

    /// Search titles, tags and loaded content
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Match near-miss spellings
        #[arg(long)]
        fuzzy: bool,

        /// Ignore tags
        #[arg(long)]
        no_tags: bool,

        /// Require query words to match with exact casing
        #[arg(long)]
        case_sensitive: bool,
    },

    /// Load documents into the cache ahead of time
    Preload {
        /// Document ids (all documents when omitted)
        ids: Vec<String>,
    },

    /// Inspect or clear the document cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Generate a source listing from a GitHub directory
    Discover {
        /// Directory as owner/repo/branch[/path]
        path: String,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// GitHub token sent as a bearer Authorization header
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum CacheCommands {
    /// Show cache size and capacity
    Stats,
    /// Remove every cached document
    Clear,
}
