mod cli;
mod commands;
mod config;
mod registry;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::StoreFile;
use registry::Registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries object content and listings.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let file = StoreFile::load(&cli.config)?;
    debug!(config = %cli.config.display(), provider = %file.provider, "Loaded store definition");

    let store = Registry::builtin().open(&file.provider, &file.config)?;

    let mut stdout = tokio::io::stdout();
    commands::run(store.as_ref(), cli.command, &mut stdout).await?;
    stdout.flush().await?;
    Ok(())
}
