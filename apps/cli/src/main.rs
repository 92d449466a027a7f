//! Voice Bolt CLI: create voice agents grounded in a company's website.
//!
//! Scrapes or crawls the website, uploads it as a knowledge document, creates
//! the agent, and makes sure the two are linked.

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
