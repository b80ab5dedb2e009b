//! stationgeo CLI — railway station coordinate enrichment tool.
//!
//! Resolves station coordinates through a geocoding service and persists
//! them idempotently into the train database.

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
