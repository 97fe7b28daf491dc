//! Harvest CLI: runs declarative extraction pipelines.
//!
//! Loads a definition document from a file or URL, resolves it against the
//! built-in operations and any configured plugins, and executes it.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
