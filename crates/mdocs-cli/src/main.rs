//! mdocs CLI entry point

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    mdocs_cli::run().await
}
