//! DocSmith CLI: build, cache and manage documentation docsets.
//!
//! Resolves a package version to its source, builds browsable docs with the
//! project's own toolchain (or downloads pre-built ones), and caches the
//! result on disk.

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
