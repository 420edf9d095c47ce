//! apicatalog CLI: collect, deduplicate and query a catalog of public web APIs.
//!
//! Pulls API descriptions from independent public catalogs into one
//! deduplicated local database, and exports it for downstream use.

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
