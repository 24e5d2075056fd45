//! docweave CLI: partition a COBOL corpus into context-bounded chunks,
//! analyze each chunk and merge the answers into one consistent record.

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
