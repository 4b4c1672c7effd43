//! mdocs CLI - browse, cache and search a markdown documentation site
//!
//! The binary is a thin layer over [`mdocs_core::Viewer`]: it loads the site
//! configuration, opens the durable cache and dispatches one command.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use mdocs_core::{FileStore, HttpSettings, KeyValueStore, SiteConfig, Viewer};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod cli;
mod commands;
mod logging;
pub mod output;

use cli::{CacheCommands, Cli, Commands};
use commands::SearchArgs;
use logging::initialize_logging;

/// Execute the mdocs CLI with the current process arguments.
///
/// # Errors
///
/// Returns an error if the site configuration cannot be loaded, the viewer
/// fails to initialize, or output cannot be written.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;
    execute(cli).await
}

async fn execute(cli: Cli) -> Result<()> {
    let format = cli.format;

    if let Commands::Discover { path, timeout, token } = &cli.command {
        let http = http_settings(&cli.config);
        return commands::discover(
            path,
            &http,
            Duration::from_secs(*timeout),
            token.as_deref(),
            format,
            io::stdout(),
        )
        .await;
    }

    let viewer = open_viewer(&cli.config).await?;
    match cli.command {
        Commands::List => commands::list_documents(viewer.documents(), format, io::stdout())?,
        Commands::Show { id } => commands::show_document(&viewer, &id, format, io::stdout()).await?,
        Commands::Search {
            query,
            limit,
            fuzzy,
            no_tags,
            case_sensitive,
        } => {
            let args = SearchArgs {
                query,
                limit,
                fuzzy,
                no_tags,
                case_sensitive,
            };
            commands::search(&viewer, &args, format, io::stdout())?;
        },
        Commands::Preload { ids } => {
            commands::preload_documents(&viewer, &ids, format, io::stdout()).await?;
        },
        Commands::Cache { action } => match action {
            CacheCommands::Stats => commands::cache_stats(&viewer, format, io::stdout())?,
            CacheCommands::Clear => commands::clear_cache(&viewer, format, io::stdout())?,
        },
        Commands::Discover { .. } => {},
    }

    viewer.shutdown();
    Ok(())
}

async fn open_viewer(path: &Path) -> Result<Viewer> {
    let config = SiteConfig::load(path)
        .with_context(|| format!("Failed to load site configuration {}", path.display()))?;

    let store: Option<Arc<dyn KeyValueStore>> = match FileStore::default_location() {
        Ok(store) => {
            debug!("Caching documents under {}", store.root().display());
            Some(Arc::new(store))
        },
        Err(e) => {
            warn!("Document cache will not persist: {e}");
            None
        },
    };

    Viewer::init(config, store)
        .await
        .into_result()
        .map_err(|info| anyhow!("{} ({})", info.user_message, info.message))
}

/// HTTP settings from the site configuration when one is readable.
fn http_settings(path: &Path) -> HttpSettings {
    if !path.exists() {
        return HttpSettings::default();
    }
    match SiteConfig::load(path) {
        Ok(config) => config.http,
        Err(e) => {
            warn!("Ignoring {}: {e}", path.display());
            HttpSettings::default()
        },
    }
}
