//! Darwin CLI: technical architecture dossier generator.
//!
//! Renders dossier requests into `.docx` documents and converts them to PDF
//! or ODT through an external converter.

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
