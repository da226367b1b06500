#![warn(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use sentinel::Config;
use sentinel::app::dispatch::dispatch;
use sentinel::cli::commands::Cli;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Config::load_or_init()?;
    dispatch(cli, config).await
}
