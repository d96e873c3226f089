//! EverythingPDF CLI: merge PDFs and images into one document.
//!
//! Classifies inputs, applies the Free/Pro upload limit, builds a single PDF
//! in queue order, and optionally publishes it behind a public link.

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
